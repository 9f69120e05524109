//! Request and response types for call endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::call::{Call, CallRole};

/// Body of `POST /api/calls`.
///
/// `caller_id` may be omitted; it defaults to the authenticated user and
/// must match them when given.
#[derive(Debug, Clone, Deserialize)]
pub struct StartCallRequest {
    #[serde(default)]
    pub caller_id: Option<String>,
    pub callee_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartCallResponse {
    pub call: Call,
    pub role: CallRole,
}

/// Standard error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn not_found(resource_type: &str, id: &str) -> Self {
        Self::new("NOT_FOUND", format!("{} not found: {}", resource_type, id))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}
