//! Compiled kernels and their entry points.
//!
//! A [`Kernel`] owns the executable region holding one compiled expression. It is
//! immutable once built, can be shared between threads, and releases its code when
//! dropped. [`Entry`] is the raw descriptor handed to foreign callers.
//!
//! # Example
//!
//! ```
//! use simdgen::{CompileOptions, Kernel};
//!
//! let kernel = Kernel::compile("x + 0.5", "x", &CompileOptions::default()).unwrap();
//! let src = [1.0, 2.0, 3.0];
//! let mut dst = [0.0; 3];
//! kernel.apply(&mut dst, &src).unwrap();
//! assert_eq!(dst, [1.5, 2.5, 3.5]);
//!
//! let sum = Kernel::compile("red_sum(x)", "x", &CompileOptions::default()).unwrap();
//! assert_eq!(sum.reduce(&src).unwrap(), 6.0);
//! ```

use std::fmt;

use colored::Colorize;
use tracing::debug;

use crate::builder::compile_program;
use crate::check::{check, check_variable};
use crate::config::CompileOptions;
use crate::errors::{KernelError, UsageError};
use crate::memory::{ExecutableRegion, WritableRegion};
use crate::opt::optimize;
use crate::parser::parse;
use crate::types::{MapFn, ReduceFn};

/// How a kernel is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Convention {
    /// `fn(dst, src, n)`, writes `f(src[i])` to `dst[i]`
    ElementwiseMap,
    /// `fn(src, n) -> f32`, returns the sum of `f(src[i])`
    ReduceSum,
}

impl Convention {
    /// Short identifier, used as the generated function's name.
    pub fn symbol(self) -> &'static str {
        match self {
            Convention::ElementwiseMap => "map",
            Convention::ReduceSum => "reduce_sum",
        }
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Convention::ElementwiseMap => f.write_str("elementwise map"),
            Convention::ReduceSum => f.write_str("reduce-sum"),
        }
    }
}

/// Address of a compiled kernel tagged with its calling convention.
///
/// An `Entry` does not keep the code alive. It is valid only while the [`Kernel`] it came
/// from exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    address: *const u8,
    convention: Convention,
}

// SAFETY: an entry is a plain address into immutable code; calling it is already unsafe.
unsafe impl Send for Entry {}
unsafe impl Sync for Entry {}

impl Entry {
    pub fn address(self) -> *const u8 {
        self.address
    }

    pub fn convention(self) -> Convention {
        self.convention
    }

    /// Calls an elementwise-map kernel on raw buffers.
    ///
    /// # Errors
    /// `ConventionMismatch` if the entry is a reduction; nothing is called then.
    ///
    /// # Safety
    /// The owning kernel must still exist, `src` must be readable and `dst` writable for
    /// `n` elements, and the two ranges must be identical or disjoint.
    pub unsafe fn call_map(self, dst: *mut f32, src: *const f32, n: usize) -> Result<(), UsageError> {
        self.expect(Convention::ElementwiseMap)?;
        // SAFETY: the code at `address` was generated with the `MapFn` signature.
        let f = unsafe { std::mem::transmute::<*const u8, MapFn>(self.address) };
        unsafe { f(dst, src, n) };
        Ok(())
    }

    /// Calls a reduce-sum kernel on a raw buffer.
    ///
    /// # Errors
    /// `ConventionMismatch` if the entry is an elementwise map; nothing is called then.
    ///
    /// # Safety
    /// The owning kernel must still exist and `src` must be readable for `n` elements.
    pub unsafe fn call_reduce(self, src: *const f32, n: usize) -> Result<f32, UsageError> {
        self.expect(Convention::ReduceSum)?;
        // SAFETY: the code at `address` was generated with the `ReduceFn` signature.
        let f = unsafe { std::mem::transmute::<*const u8, ReduceFn>(self.address) };
        Ok(unsafe { f(src, n) })
    }

    fn expect(self, found: Convention) -> Result<(), UsageError> {
        if self.convention == found {
            Ok(())
        } else {
            Err(UsageError::ConventionMismatch {
                expected: self.convention,
                found,
            })
        }
    }
}

/// One compiled expression.
#[derive(Debug)]
pub struct Kernel {
    region: ExecutableRegion,
    entry: Entry,
    source: String,
    variable: String,
    code_size: usize,
}

impl Kernel {
    /// Compiles `source` with `variable` as its free variable.
    ///
    /// Runs option validation, parsing, checking, optional constant folding, code
    /// generation and the executable-memory handoff, stopping at the first error.
    pub fn compile(
        source: &str,
        variable: &str,
        options: &CompileOptions,
    ) -> Result<Self, KernelError> {
        options.validate()?;
        check_variable(variable)?;
        let ast = parse(source, variable)?;
        let mut program = check(ast, variable)?;
        if options.fold_constants {
            program = program.map_body(optimize);
        }

        let code = compile_program(&program, options)?;
        let mut region = WritableRegion::allocate(code.bytes.len())?;
        region.as_mut_slice()[..code.bytes.len()].copy_from_slice(&code.bytes);
        let region = region.finalize()?;

        let entry = Entry {
            address: region.as_ptr(),
            convention: code.convention,
        };
        debug!(
            event = "compile",
            variable,
            convention = %code.convention,
            code_size = code.bytes.len(),
            unroll = options.unroll,
        );

        Ok(Self {
            region,
            entry,
            source: source.to_string(),
            variable: variable.to_string(),
            code_size: code.bytes.len(),
        })
    }

    pub fn entry(&self) -> Entry {
        self.entry
    }

    pub fn convention(&self) -> Convention {
        self.entry.convention
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Size of the generated machine code in bytes.
    pub fn code_size(&self) -> usize {
        self.code_size
    }

    /// Size of the executable mapping in bytes.
    pub fn region_size(&self) -> usize {
        self.region.len()
    }

    /// Writes `f(src[i])` to `dst[i]`.
    pub fn apply(&self, dst: &mut [f32], src: &[f32]) -> Result<(), UsageError> {
        self.entry.expect(Convention::ElementwiseMap)?;
        if dst.len() != src.len() {
            return Err(UsageError::LengthMismatch {
                dst: dst.len(),
                src: src.len(),
            });
        }
        // SAFETY: `self` keeps the code alive and both slices hold `src.len()` elements.
        unsafe {
            self.entry
                .call_map(dst.as_mut_ptr(), src.as_ptr(), src.len())
        }
    }

    /// Replaces every element `x` of `data` by `f(x)`.
    pub fn apply_in_place(&self, data: &mut [f32]) -> Result<(), UsageError> {
        let ptr = data.as_mut_ptr();
        // SAFETY: identical source and destination ranges are supported.
        unsafe { self.entry.call_map(ptr, ptr, data.len()) }
    }

    /// Returns the sum of `f(src[i])`.
    pub fn reduce(&self, src: &[f32]) -> Result<f32, UsageError> {
        // SAFETY: `self` keeps the code alive and `src` is valid for its length.
        unsafe { self.entry.call_reduce(src.as_ptr(), src.len()) }
    }

    /// Dispatches on the shape of the arguments: with `dst` as a map, without as a
    /// reduction. Shapes that do not match the kernel are rejected before any call.
    pub fn invoke(&self, dst: Option<&mut [f32]>, src: &[f32]) -> Result<Option<f32>, UsageError> {
        match dst {
            Some(dst) => self.apply(dst, src).map(|()| None),
            None => self.reduce(src).map(Some),
        }
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        debug!(event = "destroy", code_size = self.code_size);
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} over `{}` ({} bytes)",
            self.source.bold(),
            self.convention().to_string().cyan(),
            self.variable,
            self.code_size
        )
    }
}
