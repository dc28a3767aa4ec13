//! Crate-wide error taxonomy.
//!
//! Every component defines its own `thiserror`-derived error enum (see
//! `validator::ValidatorError`, `llm::GatewayError`, `payment::PaymentError`,
//! …), mirroring the per-module error pattern used throughout this codebase.
//! [`SurfaceKind`] and [`AppError`] are the seam where those component
//! errors get flattened into the handful of surface-visible kinds that the
//! HTTP and tool layers map to status codes and suggested-action hints.

use std::fmt;

/// Surface-visible error kind, independent of which component raised it.
///
/// These are the seven kinds named by the specification's error handling
/// section — never a Rust type name, always a wire-stable string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Schema/validation failure: empty query, `k` out of range, non-read-only SQL, malformed webhook.
    InvalidArgument,
    /// Uniqueness-of-activity violation on purchase initiation.
    Duplicate,
    /// Referenced `payment_intent_id`, quote, or memory item missing.
    NotFound,
    /// Operation not valid for the resource's current state (e.g. `complete` on a pending payment).
    PreconditionFailed,
    /// Transient upstream failure: DB pool exhausted, LLM 5xx/rate-limit after retries, vector store down.
    Unavailable,
    /// Unexpected failure; a provider-error body is attached for diagnostics.
    Runtime,
    /// Webhook signature mismatch or missing where enforced.
    Unauthorized,
}

impl SurfaceKind {
    /// The conventional HTTP status code for this kind.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidArgument => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::Duplicate => 409,
            Self::PreconditionFailed => 412,
            Self::Runtime => 500,
            Self::Unavailable => 503,
        }
    }

    /// Wire name used in tool/HTTP payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Duplicate => "duplicate",
            Self::NotFound => "not_found",
            Self::PreconditionFailed => "precondition_failed",
            Self::Unavailable => "unavailable",
            Self::Runtime => "runtime",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// Suggested action hint surfaced to the driving agent.
    #[must_use]
    pub fn suggested_action(self) -> &'static str {
        match self {
            Self::InvalidArgument | Self::Duplicate | Self::PreconditionFailed => {
                "use_different_input"
            }
            Self::Unavailable => "retry",
            Self::NotFound | Self::Unauthorized | Self::Runtime => "contact_support",
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A component error flattened for the tool/HTTP surface.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    kind: SurfaceKind,
    message: String,
}

impl AppError {
    /// Builds an `AppError` from a surface kind and a caller-facing message.
    pub fn new(kind: SurfaceKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The surface kind this error maps to.
    #[must_use]
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    /// The caller-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Implemented by every component error enum so the HTTP/tool surface can
/// flatten any of them into an [`AppError`] without a hand-written `From`
/// impl per pair.
pub trait ToSurface {
    /// Maps this error onto a surface kind.
    fn surface_kind(&self) -> SurfaceKind;
}

impl<E> From<E> for AppError
where
    E: ToSurface + std::error::Error,
{
    fn from(err: E) -> Self {
        let kind = err.surface_kind();
        AppError::new(kind, err.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status =
            axum::http::StatusCode::from_u16(self.kind.http_status()).unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "error": self.kind.as_str(),
            "message": self.message,
            "suggested_action": self.kind.suggested_action(),
        });
        (status, axum::Json(body)).into_response()
    }
}
