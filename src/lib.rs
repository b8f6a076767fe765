//! # perch
//!
//! A small HTTP router for request-handling services. A route table, a
//! first-match dispatcher, and one response shape for every outcome.
//!
//! ## The contract
//!
//! - Routes are registered explicitly, in order, once at startup. The table
//!   is read-only afterwards.
//! - Patterns are `/`-separated; `:name` segments bind one path segment.
//!   Segment counts must match exactly. No wildcards, no regexes.
//! - Lookup is **first match**, not best match. Register specific routes first.
//! - Every answer is either a JSON [`Envelope`] or a raw [`Response`] the
//!   handler chose to build.
//! - An unknown route is `404 "Route not found: {METHOD} {path}"`. A handler
//!   that fails or panics is `500 "Internal server error"`; the detail is
//!   logged, never returned.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use perch::{BoxError, Envelope, Request, Router, Server};
//!
//! struct App {
//!     greeting: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), perch::Error> {
//!     let router = Router::new()
//!         .get("/api/users/:id", get_user)
//!         .post("/api/users", create_user);
//!
//!     let app = App { greeting: "hello".into() };
//!     Server::bind("0.0.0.0:8787")?.serve(router, app).await
//! }
//!
//! async fn get_user(req: Request, app: Arc<App>) -> Result<Envelope, BoxError> {
//!     let id = req.param("id").unwrap_or_default();
//!     Ok(Envelope::success(format!("{} {id}", app.greeting)))
//! }
//!
//! async fn create_user(req: Request, _app: Arc<App>) -> Result<Envelope, BoxError> {
//!     if req.body().is_empty() {
//!         return Ok(Envelope::error("Invalid JSON body"));
//!     }
//!     Ok(Envelope::created(()))
//! }
//! ```

mod config;
mod dispatch;
mod envelope;
mod error;
mod handler;
mod method;
mod pattern;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod health;

pub use config::ServerConfig;
pub use dispatch::dispatch;
pub use envelope::Envelope;
pub use error::{BoxError, Error};
pub use handler::Handler;
pub use method::Method;
pub use pattern::{Params, Pattern, Segment};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Matched, Route, Router};
pub use server::Server;
pub use status::Status;
