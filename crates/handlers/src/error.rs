use crate::writer::Capability;
use std::io;
use thiserror::Error;

/// Errors surfaced by this crate.
///
/// Request-level failures (auth, routing misses) are rendered as responses and never show up here.
/// This type only covers misconfiguration at construction time and capability probes that the
/// underlying response writer cannot satisfy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{capability} is not supported by the underlying response writer")]
    NotSupported { capability: Capability },

    #[error("invalid timeout: {reason}")]
    InvalidTimeout { reason: String },

    #[error("invalid route pattern: {source}")]
    InvalidPattern {
        #[from]
        source: regex::Error,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl Error {
    pub fn not_supported(capability: Capability) -> Self {
        Self::NotSupported { capability }
    }

    pub fn invalid_timeout<S: ToString>(str: S) -> Self {
        Self::InvalidTimeout { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns true if this error reports a missing writer capability.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}
