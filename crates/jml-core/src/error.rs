//! Errors shared across the jml-lsp crates.

use thiserror::Error;

/// Errors that can leave the parse pipeline.
///
/// Parse failures are not represented here: a file that does not parse is
/// data ([`crate::ParseOutcome::Failure`]), not an error. Only infrastructure
/// failures (scheduler shut down, unusable URIs, unreadable files) use this
/// type.
#[derive(Error, Debug)]
pub enum JmlError {
    #[error("parse scheduler is shut down")]
    SchedulerShutdown,

    #[error("parse task for {path} was abandoned before completing")]
    TaskAbandoned { path: String },

    #[error("not a file URI: {0}")]
    InvalidUri(String),

    #[error("file too large: {size} bytes (max: {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// Returned by `DiagnosticSink` implementations whose transport
    /// can fail. The LSP client sink never does; delivery failures are logged
    /// and dropped by the publisher.
    #[error("failed to deliver diagnostics for {uri}: {message}")]
    Delivery { uri: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JmlError>;
