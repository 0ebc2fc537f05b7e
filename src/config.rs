//! Compile options.
//!
//! Options can be set in code with the builder-style setters or read from a
//! whitespace-separated `key=value` list, either given directly or taken from the
//! `SIMDGEN_OPT` environment variable:
//!
//! ```
//! use simdgen::config::{CompileOptions, OptLevel};
//!
//! let options = CompileOptions::parse("unroll=2 fold=0 opt=speed").unwrap();
//! assert_eq!(options.unroll, 2);
//! assert!(!options.fold_constants);
//! assert_eq!(options.opt_level, OptLevel::Speed);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Environment variable read by [`CompileOptions::from_env`].
pub const ENV_VAR: &str = "SIMDGEN_OPT";

/// Largest supported number of vectors per loop iteration.
pub const MAX_UNROLL: usize = 4;

/// Cranelift optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// The value of Cranelift's `opt_level` setting.
    pub fn as_str(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(OptLevel::None),
            "speed" => Ok(OptLevel::Speed),
            "speed_and_size" | "size" => Ok(OptLevel::SpeedAndSize),
            _ => Err(invalid("opt", s)),
        }
    }
}

/// Settings that control code generation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Number of 4-lane vectors processed per loop iteration, `1..=MAX_UNROLL`
    pub unroll: usize,
    /// Run the constant-folding pass before code generation
    pub fold_constants: bool,
    /// Run the Cranelift IR verifier
    pub verify: bool,
    pub opt_level: OptLevel,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            unroll: 1,
            fold_constants: true,
            verify: cfg!(debug_assertions),
            opt_level: OptLevel::default(),
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unroll(mut self, unroll: usize) -> Self {
        self.unroll = unroll;
        self
    }

    pub fn with_fold_constants(mut self, fold_constants: bool) -> Self {
        self.fold_constants = fold_constants;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    /// Parses a whitespace-separated `key=value` list on top of the defaults.
    ///
    /// Recognized keys: `unroll` (1..=4), `fold` and `verify` (`0`/`1`/`true`/`false`),
    /// `opt` (`none`, `speed`, `speed_and_size`). Later entries override earlier ones.
    ///
    /// # Errors
    /// Returns a `ConfigError` for entries without `=`, unknown keys, or values outside
    /// an option's domain.
    pub fn parse(options: &str) -> Result<Self, ConfigError> {
        let mut parsed = Self::default();
        for entry in options.split_whitespace() {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedEntry(entry.to_string()))?;
            match key {
                "unroll" => {
                    parsed.unroll = value.parse().map_err(|_| invalid(key, value))?;
                }
                "fold" => parsed.fold_constants = parse_flag(key, value)?,
                "verify" => parsed.verify = parse_flag(key, value)?,
                "opt" => parsed.opt_level = value.parse()?,
                _ => return Err(ConfigError::UnknownOption(key.to_string())),
            }
        }
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reads options from `SIMDGEN_OPT`, falling back to the defaults when it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(ENV_VAR) {
            Ok(options) => Self::parse(&options),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Checks that every option is within its supported range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_UNROLL).contains(&self.unroll) {
            return Err(invalid("unroll", &self.unroll.to_string()));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
