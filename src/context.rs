//! One-shot compilation context.
//!
//! A [`Context`] moves through `empty → compiled → destroyed`. It yields at most one
//! kernel: a second `compile` is a usage error and leaves the first kernel in place.
//! A failed compile leaves the context empty, so it can be retried with a corrected
//! source. `destroy` releases the kernel's executable memory and may be called any
//! number of times.
//!
//! Compile and destroy take `&mut self`, so the borrow checker already keeps them from
//! racing with invocations through the same context. Raw [`Entry`] descriptors are
//! outside that protection: the caller must stop using them before `destroy`.

use tracing::debug;

use crate::config::CompileOptions;
use crate::errors::{KernelError, UsageError};
use crate::kernel::{Entry, Kernel};

#[derive(Debug, Default)]
enum State {
    #[default]
    Empty,
    Compiled(Kernel),
    Destroyed,
}

/// Owner of zero or one compiled kernel.
#[derive(Debug, Default)]
pub struct Context {
    options: CompileOptions,
    state: State,
}

impl Context {
    /// Creates an empty context with default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self {
            options,
            state: State::Empty,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compiles `source` and keeps the resulting kernel.
    ///
    /// # Errors
    /// `UsageError::AlreadyCompiled` or `UsageError::Destroyed` if the context is not
    /// empty, otherwise the first error of the compile pipeline. The context is
    /// unchanged on error.
    pub fn compile(&mut self, source: &str, variable: &str) -> Result<Entry, KernelError> {
        match self.state {
            State::Empty => {}
            State::Compiled(_) => return Err(UsageError::AlreadyCompiled.into()),
            State::Destroyed => return Err(UsageError::Destroyed.into()),
        }
        let kernel = Kernel::compile(source, variable, &self.options)?;
        let entry = kernel.entry();
        self.state = State::Compiled(kernel);
        Ok(entry)
    }

    /// The compiled kernel.
    pub fn kernel(&self) -> Result<&Kernel, UsageError> {
        match &self.state {
            State::Compiled(kernel) => Ok(kernel),
            State::Empty => Err(UsageError::NotCompiled),
            State::Destroyed => Err(UsageError::Destroyed),
        }
    }

    pub fn apply(&self, dst: &mut [f32], src: &[f32]) -> Result<(), UsageError> {
        self.kernel()?.apply(dst, src)
    }

    pub fn apply_in_place(&self, data: &mut [f32]) -> Result<(), UsageError> {
        self.kernel()?.apply_in_place(data)
    }

    pub fn reduce(&self, src: &[f32]) -> Result<f32, UsageError> {
        self.kernel()?.reduce(src)
    }

    /// See [`Kernel::invoke`].
    pub fn invoke(&self, dst: Option<&mut [f32]>, src: &[f32]) -> Result<Option<f32>, UsageError> {
        self.kernel()?.invoke(dst, src)
    }

    /// Releases the kernel, if any. Later calls are no-ops.
    pub fn destroy(&mut self) {
        if self.is_destroyed() {
            return;
        }
        let had_kernel = self.is_compiled();
        self.state = State::Destroyed;
        debug!(event = "context_destroy", had_kernel);
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.state, State::Compiled(_))
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.state, State::Destroyed)
    }
}
