//! Built-in health-check handlers.
//!
//! Generic over the application state, so they register on any router:
//!
//! ```rust,no_run
//! use perch::{Router, health};
//!
//! struct App;
//!
//! let app: Router<App> = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler if you need to gate on
//! dependency availability.

use std::sync::Arc;

use serde_json::json;

use crate::{BoxError, Envelope, Request};

/// Always `200 {"success":true,"data":{"status":"healthy"}}`.
pub async fn liveness<S>(_req: Request, _state: Arc<S>) -> Result<Envelope, BoxError> {
    Ok(Envelope::success(json!({ "status": "healthy" })))
}

/// Default readiness probe: `200 {"success":true,"data":{"status":"ready"}}`.
pub async fn readiness<S>(_req: Request, _state: Arc<S>) -> Result<Envelope, BoxError> {
    Ok(Envelope::success(json!({ "status": "ready" })))
}
