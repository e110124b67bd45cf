//! Run-level alignment failures.

use std::time::Duration;

use thiserror::Error;

/// Failure of the external aligner for a whole run.
///
/// Any of these means the run has no real timings; the orchestrator
/// substitutes empty per-line results.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("failed to launch aligner '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("aligner I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("aligner exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },
    #[error("aligner reported an error: {0}")]
    Reported(String),
    #[error("malformed aligner payload: {0}")]
    MalformedPayload(String),
    #[error("aligner timed out after {0:?}")]
    Timeout(Duration),
    #[error("aligner run was cancelled")]
    Cancelled,
}

impl AlignError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn malformed(err: impl std::fmt::Display) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}
