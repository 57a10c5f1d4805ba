//! Interpreter configuration.

use anyhow::{Context, Result};
use std::env;

/// Environment variable overriding [`InterpConfig::max_call_depth`].
pub const MAX_CALL_DEPTH_VAR: &str = "FIR_INTERP_MAX_CALL_DEPTH";
/// Environment variable overriding [`InterpConfig::sanitize_memory`].
pub const SANITIZE_VAR: &str = "FIR_INTERP_SANITIZE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpConfig {
    /// Number of frames allowed before a call fails with `StackOverflow`.
    pub max_call_depth: usize,
    /// Reject raw loads and stores outside interpreter-owned allocations.
    pub sanitize_memory: bool,
    /// Run the module's global initializer function during `initialize`.
    pub run_global_init: bool,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            sanitize_memory: false,
            run_global_init: true,
        }
    }
}

impl InterpConfig {
    /// Default configuration with overrides read from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(depth) = lookup(MAX_CALL_DEPTH_VAR) {
            config.max_call_depth = depth
                .trim()
                .parse()
                .with_context(|| format!("invalid {MAX_CALL_DEPTH_VAR} value `{depth}`"))?;
        }
        if let Some(flag) = lookup(SANITIZE_VAR) {
            config.sanitize_memory = parse_flag(&flag)
                .with_context(|| format!("invalid {SANITIZE_VAR} value `{flag}`"))?;
        }
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, found `{other}`"),
    }
}
