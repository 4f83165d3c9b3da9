//! Loader diagnostic trace
//!
//! Messages are only emitted when the `logging` flag is set. They go through
//! `tracing` when a subscriber is installed and straight to stderr otherwise.

use std::fmt::Display;
use tracing::info;

/// Target used for the loader's trace messages
pub const DIAGNOSTIC_TARGET: &str = "require";

/// Flag-gated diagnostic sink
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticSink {
    enabled: bool,
}

impl DiagnosticSink {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit `message`; returns `false` without emitting when disabled
    pub fn log(&self, message: impl Display) -> bool {
        if !self.enabled {
            return false;
        }
        if tracing::dispatcher::has_been_set() {
            info!(target: DIAGNOSTIC_TARGET, "require: {}", message);
        } else {
            eprintln!("require: {}", message);
        }
        true
    }
}
