//! Error types for the simdgen crate.
//!
//! This module defines the error types that can occur while turning an expression string
//! into a running kernel. Each stage of the pipeline has its own error type:
//!
//! - `ParseError`: malformed syntax or unknown symbols, tagged with a byte position
//! - `SemanticError`: arity and variable-name violations found by the checker
//! - `CodegenError`: failures inside Cranelift or generator invariant violations
//! - `AllocationError`: executable memory could not be mapped or protected
//! - `UsageError`: API misuse such as recompiling a context or mismatched buffers
//! - `ConfigError`: malformed compile options
//!
//! `KernelError` wraps all of them and is what the public entry points return.

use cranelift_codegen::settings::SetError;
use thiserror::Error;

use crate::expr::FuncKind;
use crate::kernel::Convention;

/// A syntax error, tagged with the byte offset in the source where it was detected.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} at position {position}")]
pub struct ParseError {
    /// Byte offset into the source string
    pub position: usize,
    /// What went wrong
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(position: usize, kind: ParseErrorKind) -> Self {
        Self { position, kind }
    }
}

/// Category of parse error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// A character that starts no token
    #[error("unexpected character `{0}`")]
    UnexpectedChar(String),
    /// A token that does not fit the grammar at this point
    #[error("unexpected `{found}`, expected {expected}")]
    UnexpectedToken { found: String, expected: String },
    /// The source ended in the middle of an expression
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: String },
    /// A literal that does not parse as a float
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    /// An identifier that is neither the declared variable nor a function
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),
    /// A call to a function that is not in the registry
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    /// A function name used as a value
    #[error("function `{0}` must be called with parentheses")]
    MissingCall(String),
    /// `red_sum` used anywhere except as the whole expression
    #[error("`red_sum` is only supported around the entire expression")]
    MisplacedReduction,
    /// Input left over after a complete expression
    #[error("unexpected trailing input `{0}`")]
    TrailingInput(String),
}

/// Errors found while validating a parsed expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SemanticError {
    /// A function was called with the wrong number of arguments
    #[error("function `{function}` takes {expected} argument(s), got {found}")]
    ArityMismatch {
        function: FuncKind,
        expected: usize,
        found: usize,
    },
    /// A variable other than the declared one was referenced
    #[error("expected variable `{expected}`, found `{found}`")]
    VariableMismatch { expected: String, found: String },
    /// The declared variable never appears in the expression
    #[error("variable `{0}` does not appear in the expression")]
    MissingVariable(String),
    /// The declared variable name is not a single identifier
    #[error("`{0}` is not a valid variable name")]
    InvalidVariable(String),
    /// The declared variable name is taken by `red_sum` or a function
    #[error("`{0}` is reserved and cannot be used as the variable name")]
    ReservedVariable(String),
}

/// Errors that can occur while lowering an expression to machine code.
///
/// Apart from host detection, these indicate a mismatch between the checker and the
/// generator and are not expected in correct operation.
#[derive(Error, Debug)]
pub enum CodegenError {
    /// Error when the target machine architecture is not supported
    #[error("host machine is not supported: {0}")]
    HostMachineNotSupported(String),
    /// Error when a Cranelift setting is rejected
    #[error("invalid codegen setting: {0}")]
    Settings(#[from] SetError),
    /// Error during Cranelift code generation
    #[error("codegen error: {0}")]
    Cranelift(#[from] cranelift_codegen::CodegenError),
    /// An AST shape reached the generator that the checker should have rejected
    #[error("unsupported expression shape: {0}")]
    UnsupportedShape(String),
    /// The emitted code needs relocations, which a standalone region cannot satisfy
    #[error("generated code requires {0} relocation(s)")]
    UnexpectedRelocations(usize),
}

/// Errors raised by the executable memory manager.
#[derive(Error, Debug)]
pub enum AllocationError {
    /// `mmap` refused the request
    #[error("failed to map {size} bytes: {source}")]
    Map {
        size: usize,
        #[source]
        source: std::io::Error,
    },
    /// `mprotect` refused to flip the region to read+execute
    #[error("failed to make {size} bytes executable: {source}")]
    Protect {
        size: usize,
        #[source]
        source: std::io::Error,
    },
    /// Zero-length code cannot be mapped
    #[error("refusing to allocate an empty region")]
    Empty,
    /// The host has no supported way to map executable pages
    #[error("executable memory is not supported on this platform")]
    Unsupported,
}

/// API misuse detected at the boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UsageError {
    /// A context yields at most one kernel
    #[error("context already holds a compiled kernel")]
    AlreadyCompiled,
    /// Invocation before a successful compile
    #[error("context has no compiled kernel")]
    NotCompiled,
    /// Invocation after destroy
    #[error("context has been destroyed")]
    Destroyed,
    /// Destination and source lengths differ
    #[error("buffer length mismatch: dst has {dst} elements, src has {src}")]
    LengthMismatch { dst: usize, src: usize },
    /// Arguments that do not match the kernel's calling convention
    #[error("kernel uses the {expected} convention, called as {found}")]
    ConventionMismatch {
        expected: Convention,
        found: Convention,
    },
}

/// Errors in compile option strings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An entry that is not `key=value`
    #[error("malformed option `{0}`, expected key=value")]
    MalformedEntry(String),
    /// A key that no option answers to
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    /// A value outside the option's domain
    #[error("invalid value `{value}` for option `{key}`")]
    InvalidValue { key: String, value: String },
}

/// Top-level error returned by compile and invoke entry points.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Error when parsing the expression string
    #[error("failed to parse expression: {0}")]
    Parse(#[from] ParseError),
    /// Error when the parsed expression violates a semantic rule
    #[error("invalid expression: {0}")]
    Semantic(#[from] SemanticError),
    /// Error when lowering to machine code
    #[error("failed to generate code: {0}")]
    Codegen(#[from] CodegenError),
    /// Error when mapping executable memory
    #[error("failed to allocate executable memory: {0}")]
    Allocation(#[from] AllocationError),
    /// API misuse
    #[error("invalid usage: {0}")]
    Usage(#[from] UsageError),
    /// Bad compile options
    #[error("invalid compile options: {0}")]
    Config(#[from] ConfigError),
}
