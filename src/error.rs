//! Error handling for the CDR envelope integration engine.
//!
//! Every failure mode of the listing, push and resolution flows maps to a
//! distinct variant here using thiserror. Nothing is retried: a remote
//! failure is surfaced to the immediate caller as-is. Only the push flow
//! downgrades a non-200 HTTP status into a domain-level
//! [`XmlSaveResult`](crate::model::XmlSaveResult) failure, because a
//! rejected save is an expected user-facing condition rather than a
//! transport or programming fault.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CdrError>;

/// Main error type for the envelope integration engine.
#[derive(Error, Debug)]
pub enum CdrError {
    /// The RPC payload did not match the expected schema-to-files shape.
    /// The raw payload is kept for diagnostics; this always indicates a
    /// contract violation between us and the envelope service.
    #[error("unexpected response format from CDR envelope service: {payload}")]
    MalformedUpstreamResponse { payload: String },

    /// Transport-level failure reaching the envelope (connection refused,
    /// timeout, malformed target URL).
    #[error("unable to reach CDR envelope service: {0}")]
    RemoteUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The envelope answered the RPC call with an XML-RPC fault.
    #[error("envelope service fault {code}: {message}")]
    RpcFault { code: i32, message: String },

    /// Remote file fetch for editing returned a non-success status or
    /// failed in transit.
    #[error("file is not available from {url}")]
    FileNotAvailable { url: String },

    /// Caller attempted to push a file that was not sourced from the CDR
    /// envelope. This is a caller bug, never a retryable condition.
    #[error("provided file does not belong to CDR")]
    InvalidOperation,

    /// A required request parameter was absent.
    #[error("{name} parameter is required")]
    MissingParameter { name: &'static str },

    /// No active main-form webform is registered for the requested schema.
    #[error("no web forms for '{schema}' schema found")]
    NoWebformForSchema { schema: String },

    /// A requested file conversion could not be applied.
    #[error("conversion {conversion_id} failed: {reason}")]
    Conversion { conversion_id: i32, reason: String },

    /// A storage or lookup collaborator failed.
    #[error("storage operation failed: {0}")]
    Storage(String),
}

impl CdrError {
    /// Wraps a transport error from the HTTP client.
    pub fn remote(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CdrError::RemoteUnavailable(Box::new(err))
    }
}
