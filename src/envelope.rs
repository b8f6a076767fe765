//! The uniform JSON response shape.
//!
//! Every route answers with one of two bodies:
//!
//! ```text
//! {"success": true,  "data": <any>}
//! {"success": false, "error": "<message>"}
//! ```
//!
//! The HTTP status travels next to the body, not inside it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::response::{IntoResponse, Response};
use crate::status::Status;

pub(crate) const INTERNAL_ERROR: &str = "Internal server error";

/// Used if encoding the envelope itself ever fails.
const FALLBACK_BODY: &[u8] = br#"{"success":false,"error":"Internal server error"}"#;

/// A success or error envelope plus its status code.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip, default = "default_status")]
    status: Status,
    /// Set when a payload failed to encode; pins the status at `500`.
    #[serde(skip)]
    degraded: bool,
}

fn default_status() -> Status {
    Status::Ok
}

impl Envelope {
    /// `200` success. `Envelope::success(())` produces `"data": null`.
    ///
    /// A payload that cannot be represented as JSON (e.g. a map with
    /// non-string keys) is an internal failure: the envelope degrades to the
    /// generic `500` and the cause is logged.
    pub fn success<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
                status: Status::Ok,
                degraded: false,
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to encode envelope payload");
                Self { degraded: true, ..Self::internal() }
            }
        }
    }

    /// `201` success.
    pub fn created<T: Serialize>(data: T) -> Self {
        Self::success(data).with_status(Status::Created)
    }

    /// `400` error.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            status: Status::BadRequest,
            degraded: false,
        }
    }

    /// `404` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(message).with_status(Status::NotFound)
    }

    /// `409` error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::error(message).with_status(Status::Conflict)
    }

    /// The generic `500`. Carries no detail about what went wrong.
    pub fn internal() -> Self {
        Self::error(INTERNAL_ERROR).with_status(Status::InternalServerError)
    }

    /// Overrides the status.
    ///
    /// An envelope whose payload failed to encode keeps its `500`.
    pub fn with_status(mut self, status: Status) -> Self {
        if !self.degraded {
            self.status = status;
        }
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let body = serde_json::to_vec(&self).unwrap_or_else(|_| FALLBACK_BODY.to_vec());
        Response::builder().status(self.status).json(body)
    }
}
