//! Runtime settings for the interpreter.

use lazy_static::lazy_static;
use std::sync::RwLock;

/// Configuration flags consulted during simulation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Suppresses all logging below the error level.
    pub quiet: bool,
    /// Raise an error when an arithmetic primitive overflows its output
    /// width instead of silently truncating.
    pub error_on_overflow: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quiet: false,
            error_on_overflow: false,
        }
    }
}

lazy_static! {
    /// Global settings. Read by the root logger on first use, so quietness
    /// should be configured before any logging happens.
    pub static ref SETTINGS: RwLock<Config> = RwLock::new(Config::default());
}
