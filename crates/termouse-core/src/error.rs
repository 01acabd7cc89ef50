#![forbid(unsafe_code)]

//! Error taxonomy.
//!
//! Lifecycle errors (`Configuration`, `Io`) are returned synchronously from
//! engine operations and always leave the engine in a well-defined,
//! previously-valid state. `Stream` errors travel asynchronously on the
//! engine's error channel to pull-stream consumers. `Cancelled` is raised
//! when a cancellation token fires. Malformed wire input is never an error;
//! the decoder skips it.

use std::fmt;
use std::io;

/// Errors surfaced by the engine and event streams.
#[derive(Debug)]
pub enum MouseError {
    /// The input source cannot support mouse reporting (not interactive).
    Configuration(String),

    /// Writing control sequences or switching terminal modes failed.
    Io {
        /// What was being attempted.
        context: &'static str,
        /// The underlying failure.
        source: io::Error,
    },

    /// An error published on the engine's error channel, e.g. a panicking
    /// subscriber callback.
    Stream(String),

    /// A cancellation token fired.
    Cancelled,
}

impl fmt::Display for MouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MouseError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            MouseError::Io { context, source } => write!(f, "{context}: {source}"),
            MouseError::Stream(msg) => write!(f, "stream error: {msg}"),
            MouseError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for MouseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MouseError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl MouseError {
    /// Wrap an I/O failure with the operation it interrupted.
    #[must_use]
    pub fn io(context: &'static str, source: io::Error) -> Self {
        MouseError::Io { context, source }
    }

    /// True for errors raised by a cancellation token.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, MouseError::Cancelled)
    }
}

/// Result alias used across termouse.
pub type Result<T> = std::result::Result<T, MouseError>;
