//! Minimal perch example: a couple of envelope routes and health checks.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8787/users/42
//!   curl -X POST http://localhost:8787/users -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:8787/users/42
//!   curl http://localhost:8787/no/such/path
//!   curl http://localhost:8787/healthz

use std::sync::Arc;

use perch::{BoxError, Envelope, Request, Router, Server, ServerConfig, Status, health};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), perch::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let app = Router::new()
        .get("/users/:id",    get_user)
        .post("/users",       create_user)
        .delete("/users/:id", delete_user)
        .get("/healthz",      health::liveness)
        .get("/readyz",       health::readiness);

    Server::from_config(&ServerConfig::from_env())?
        .serve(app, ())
        .await
}

// GET /users/:id
async fn get_user(req: Request, _: Arc<()>) -> Result<Envelope, BoxError> {
    let id = req.param("id").unwrap_or_default();
    Ok(Envelope::success(json!({ "id": id, "name": "alice" })))
}

// POST /users
async fn create_user(req: Request, _: Arc<()>) -> Result<Envelope, BoxError> {
    let Some(body) = req.json::<Value>() else {
        return Ok(Envelope::error("Invalid JSON body"));
    };
    let name = body["name"].as_str().unwrap_or_default().trim();
    if name.is_empty() {
        return Ok(Envelope::error("Name is required"));
    }
    Ok(Envelope::created(json!({ "id": "99", "name": name })))
}

// DELETE /users/:id → 204 No Content
async fn delete_user(_req: Request, _: Arc<()>) -> Result<Status, BoxError> {
    Ok(Status::NoContent)
}
