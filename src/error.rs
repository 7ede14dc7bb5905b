//! Error types shared across the request pipeline.
//!
//! Every failure inside handler resolution is represented as an [`Error`]
//! carrying a tagged [`ErrorKind`]. Errors bubble up through the dispatcher
//! to a single per-request boundary in the server, which converts the first
//! unresolved error into an HTTP response with a JSON envelope.

use serde_json::{json, Value};

/// Classification of a request-pipeline failure.
///
/// The kind decides the HTTP status the error boundary responds with and the
/// label prefixed to the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No route/handler/static file matched, or the method is not allowed.
    NotFound,
    /// A header/params/querystring/body schema was violated.
    Validation,
    /// The request is missing something it was asked for (e.g. query string).
    BadRequest,
    /// The payload could not be parsed (malformed JSON).
    Parse,
    /// A multipart body had a malformed boundary or framing.
    Multipart,
    /// The response was already committed or could not be written.
    Send,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Message label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Parse => "PARSE_ERROR",
            ErrorKind::Multipart => "MULTIPART_ERROR",
            ErrorKind::Send => "SEND_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the error boundary maps this kind to.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation
            | ErrorKind::BadRequest
            | ErrorKind::Parse
            | ErrorKind::Multipart => 400,
            ErrorKind::Send | ErrorKind::Internal => 500,
        }
    }
}

/// A request-pipeline error: a kind plus a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {}", .kind.label(), .message)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn multipart(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Multipart, message)
    }

    pub fn send(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Send, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    /// JSON error envelope sent to clients: `{"error": true, "message": ...}`.
    pub fn envelope(&self) -> Value {
        json!({ "error": true, "message": self.to_string() })
    }
}
