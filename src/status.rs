//! HTTP status codes as a typed enum.
//!
//! The router itself only ever produces `404` and `500`. The rest are the
//! codes handlers pick for their own outcomes: `201` on create, `400` on bad
//! input, `409` on a uniqueness clash.
//!
//! ```rust
//! use perch::{Envelope, Status};
//!
//! Envelope::error("Email already exists").with_status(Status::Conflict);
//! ```

/// Status codes used by perch and its handlers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                  // 200
    Created,             // 201
    NoContent,           // 204

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,          // 400
    Unauthorized,        // 401
    Forbidden,           // 403
    NotFound,            // 404
    Conflict,            // 409
    ContentTooLarge,     // 413
    UnprocessableContent, // 422

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError, // 500
    ServiceUnavailable,  // 503
}

impl Status {
    pub fn code(self) -> u16 {
        self.into()
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                   => 200,
            Status::Created              => 201,
            Status::NoContent            => 204,
            Status::BadRequest           => 400,
            Status::Unauthorized         => 401,
            Status::Forbidden            => 403,
            Status::NotFound             => 404,
            Status::Conflict             => 409,
            Status::ContentTooLarge      => 413,
            Status::UnprocessableContent => 422,
            Status::InternalServerError  => 500,
            Status::ServiceUnavailable   => 503,
        }
    }
}

impl From<Status> for http::StatusCode {
    fn from(s: Status) -> http::StatusCode {
        // Every variant is a registered code, so this never falls back.
        http::StatusCode::from_u16(s.code()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}
