//! Runtime compilation of single-variable math expressions into SIMD kernels.
//!
//! This crate compiles expressions such as `log(cosh(x))` or `red_sum(exp(x*x*0.1+0.3))`
//! into native code that runs over contiguous `f32` buffers. It uses
//! [Cranelift](https://github.com/bytecodealliance/wasmtime/tree/main/cranelift) to emit
//! 4-lane vector loops with a scalar tail, and maps the result into its own executable
//! pages.
//!
//! # Features
//!
//! - Elementwise maps (`dst[i] = f(src[i])`) and sum reductions (`red_sum(f(x))`)
//! - Inline vectorized `exp`, `log`, `sin`, `cosh`, `tanh`, plus `inv`, `sqrt`, `abs`
//! - Configurable unrolling, constant folding and optimization level
//! - Kernels are immutable and can be invoked from many threads at once
//!
//! # Example
//!
//! ```rust
//! use simdgen::Context;
//!
//! let mut ctx = Context::new();
//! ctx.compile("red_sum(x*x)", "x").unwrap();
//!
//! let sum = ctx.reduce(&[1.0, 2.0, 3.0]).unwrap(); // Returns 14.0
//! assert_eq!(sum, 14.0);
//!
//! ctx.destroy();
//! ```

pub use config::CompileOptions;
pub use context::Context;
pub use errors::KernelError;
pub use kernel::{Convention, Entry, Kernel};

pub mod prelude {
    pub use crate::builder::clif_ir;
    pub use crate::check::{check, check_variable, Program};
    pub use crate::config::{CompileOptions, OptLevel};
    pub use crate::context::Context;
    pub use crate::expr::{Expr, FuncKind};
    pub use crate::kernel::{Convention, Entry, Kernel};
    pub use crate::parser::parse;
}

/// Code generation with Cranelift
pub mod builder;
/// Semantic checks on parsed expressions
pub mod check;
/// Compile options
pub mod config;
/// One-shot compilation context
pub mod context;
/// Error types for the various failure modes
pub mod errors;
/// Expression tree representation
pub mod expr;
/// Compiled kernels and entry descriptors
pub mod kernel;
/// Tokenizer
pub mod lexer;
/// Executable memory regions
pub mod memory;
/// Constant folding
pub mod opt;
/// Recursive-descent parser
pub mod parser;
/// Native kernel signatures
pub mod types;

pub(crate) mod lanes;
/// Vectorized lowerings of the math functions
pub(crate) mod operators {
    pub(crate) mod exp;
    pub(crate) mod hyperbolic;
    pub(crate) mod ln;
    pub(crate) mod sqrt;
    pub(crate) mod trigonometric;
}
