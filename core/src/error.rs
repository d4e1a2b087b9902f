//! Error types for the CRM client core.
//!
//! # Design
//! "No data" is not an error: the decoder returns an empty list for it. The
//! remaining failure modes are split by who is at fault. `TypeMismatch` and
//! `MissingField` are caller mistakes caught before any round-trip,
//! `RemoteError` carries the service's own error envelope verbatim, and
//! `MalformedResponse` names the path that was expected but absent. Nothing
//! in this crate retries; every variant propagates to the caller.

use thiserror::Error;

/// Errors returned by the encoder, the decoders and `RecordOperations`.
#[derive(Debug, Error)]
pub enum CrmError {
    /// A value had the wrong shape where a record (or scalar field) was required.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// The reply lacked an expected path and carried no "no data" marker.
    #[error("malformed response: missing {path}")]
    MalformedResponse { path: String },

    /// The service answered with its own error envelope.
    #[error("remote error {code}: {message}")]
    RemoteError { code: String, message: String },

    /// The session could not be opened.
    #[error("connection failed: {0}")]
    ConnectionError(String),

    /// The transport failed to complete a round-trip.
    #[error("transport failed: {0}")]
    Transport(String),

    /// A record lacked a field the operation depends on.
    #[error("record is missing field {field}")]
    MissingField { field: String },

    /// The request document could not be written.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The reply body was not valid JSON/XML for the expected shape.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),
}

impl CrmError {
    pub(crate) fn malformed(path: impl Into<String>) -> Self {
        CrmError::MalformedResponse { path: path.into() }
    }
}
