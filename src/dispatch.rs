//! Request entry point: route, handle, respond.
//!
//! ```text
//! Routing ──no route──────────────────────────────▶ 404 "Route not found: {METHOD} {path}"
//!    │
//!    └─match─▶ Handling ──Ok(response)───────────▶ Responding (handler's envelope or raw body)
//!                 │
//!                 └─Err / panic──▶ log ──────────▶ 500 "Internal server error"
//! ```
//!
//! This is the only place handler failures are caught. Whatever detail they
//! carry goes to the log and never to the caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error};

use crate::envelope::Envelope;
use crate::handler::BoxedHandler;
use crate::method::Method;
use crate::pattern::Params;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Router;

/// Routes one request and produces exactly one response. Never fails.
pub async fn dispatch<S>(router: &Router<S>, state: Arc<S>, req: Request) -> Response {
    let Some((handler, params)) = route(router, &req) else {
        debug!(method = %req.method(), path = %req.path(), "no route");
        return not_found(&req);
    };

    let method = req.method().to_owned();
    let path = req.path().to_owned();
    let req = req.with_params(params);

    let outcome = AssertUnwindSafe(async move { handler.call(req, state).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!(%method, %path, error = %e, details = ?e, "handler failed");
            Envelope::internal().into_response()
        }
        Err(panic) => {
            error!(%method, %path, panic = panic_message(&*panic), "handler panicked");
            Envelope::internal().into_response()
        }
    }
}

fn route<S>(router: &Router<S>, req: &Request) -> Option<(BoxedHandler<S>, Params)> {
    // A method outside the routable set has no routes at all.
    let method: Method = req.method().parse().ok()?;
    let matched = router.lookup(method, req.path())?;
    debug!(%method, pattern = %matched.route.pattern(), "route matched");
    Some((matched.route.handler(), matched.params))
}

fn not_found(req: &Request) -> Response {
    Envelope::not_found(format!("Route not found: {} {}", req.method(), req.path()))
        .into_response()
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::{Value, json};
    use tokio::sync::RwLock;

    use super::*;
    use crate::error::BoxError;
    use crate::status::Status;

    fn json_body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    async fn echo_id(req: Request, _: Arc<()>) -> Result<Envelope, BoxError> {
        Ok(Envelope::success(json!({ "id": req.param("id") })))
    }

    async fn special(_: Request, _: Arc<()>) -> Result<Envelope, BoxError> {
        Ok(Envelope::success("special"))
    }

    #[tokio::test]
    async fn unknown_route_is_404_with_method_and_path() {
        let router = Router::new().get("/api/users/:id", echo_id);
        let res = dispatch(&router, Arc::new(()), Request::new("GET", "/no/such/path")).await;

        assert_eq!(res.status_code(), 404);
        assert_eq!(
            json_body(&res),
            json!({"success": false, "error": "Route not found: GET /no/such/path"}),
        );
    }

    #[tokio::test]
    async fn unsupported_method_is_404() {
        let router = Router::new().get("/api/users/:id", echo_id);
        let res = dispatch(&router, Arc::new(()), Request::new("PATCH", "/api/users/1")).await;

        assert_eq!(res.status_code(), 404);
        assert_eq!(json_body(&res)["error"], "Route not found: PATCH /api/users/1");
    }

    #[tokio::test]
    async fn handler_receives_bindings() {
        let router = Router::new().get("/api/users/:id", echo_id);
        let res = dispatch(&router, Arc::new(()), Request::new("GET", "/api/users/42")).await;

        assert_eq!(res.status_code(), 200);
        assert_eq!(json_body(&res), json!({"success": true, "data": {"id": "42"}}));
    }

    #[tokio::test]
    async fn first_registered_route_wins_over_later_literal() {
        let router = Router::new()
            .get("/api/users/:id", echo_id)
            .get("/api/users/special", special);

        let res = dispatch(&router, Arc::new(()), Request::new("GET", "/api/users/special")).await;
        assert_eq!(json_body(&res), json!({"success": true, "data": {"id": "special"}}));
    }

    #[tokio::test]
    async fn handler_error_is_generic_500() {
        async fn failing(_: Request, _: Arc<()>) -> Result<Envelope, BoxError> {
            Err("db connection refused at 10.0.0.3:5432".into())
        }
        let router = Router::new().post("/api/users", failing);
        let res = dispatch(&router, Arc::new(()), Request::new("POST", "/api/users")).await;

        assert_eq!(res.status_code(), 500);
        assert_eq!(json_body(&res), json!({"success": false, "error": "Internal server error"}));
        let raw = String::from_utf8_lossy(res.body());
        assert!(!raw.contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn handler_panic_is_generic_500() {
        async fn panicking(_: Request, _: Arc<()>) -> Result<Envelope, BoxError> {
            panic!("index out of bounds: secret detail")
        }
        let router = Router::new().get("/boom", panicking);
        let res = dispatch(&router, Arc::new(()), Request::new("GET", "/boom")).await;

        assert_eq!(res.status_code(), 500);
        assert!(!String::from_utf8_lossy(res.body()).contains("secret"));
    }

    #[tokio::test]
    async fn validation_envelope_passes_through_unchanged() {
        async fn create(req: Request, _: Arc<()>) -> Result<Envelope, BoxError> {
            if req.json::<Value>().is_none() {
                return Ok(Envelope::error("Invalid JSON body"));
            }
            Ok(Envelope::conflict("Email already exists"))
        }
        let router = Router::new().post("/api/users", create);

        let res = dispatch(&router, Arc::new(()), Request::new("POST", "/api/users")).await;
        assert_eq!(res.status_code(), 400);
        assert_eq!(json_body(&res)["error"], "Invalid JSON body");

        let req = Request::new("POST", "/api/users").with_body("{}");
        let res = dispatch(&router, Arc::new(()), req).await;
        assert_eq!(res.status_code(), 409);
    }

    #[derive(Default)]
    struct Cache {
        kv: RwLock<HashMap<String, String>>,
    }

    async fn cache_get(req: Request, app: Arc<Cache>) -> Result<Response, BoxError> {
        let key = req.param("key").unwrap_or_default();
        Ok(match app.kv.read().await.get(key) {
            Some(value) => Response::text(value.clone()),
            None => Envelope::not_found("Not found").into_response(),
        })
    }

    async fn cache_put(req: Request, app: Arc<Cache>) -> Result<Response, BoxError> {
        let key = req.param("key").unwrap_or_default().to_owned();
        app.kv.write().await.insert(key, req.text());
        Ok(Response::text("Cached"))
    }

    #[tokio::test]
    async fn cache_put_then_get_returns_raw_body() {
        let router = Router::new()
            .get("/api/cached/:key", cache_get)
            .put("/api/cached/:key", cache_put);
        let state = Arc::new(Cache::default());

        let miss = dispatch(&router, state.clone(), Request::new("GET", "/api/cached/mykey")).await;
        assert_eq!(miss.status_code(), 404);

        let put = Request::new("PUT", "/api/cached/mykey").with_body("hello");
        let res = dispatch(&router, state.clone(), put).await;
        assert_eq!(res.status_code(), 200);
        assert_eq!(state.kv.read().await.get("mykey").map(String::as_str), Some("hello"));

        let res = dispatch(&router, state, Request::new("GET", "/api/cached/mykey")).await;
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.body(), b"hello");
    }

    #[tokio::test]
    async fn raw_status_response_passes_through() {
        async fn gone(_: Request, _: Arc<()>) -> Result<Status, BoxError> {
            Ok(Status::NoContent)
        }
        let router = Router::new().delete("/api/users/:id", gone);
        let res = dispatch(&router, Arc::new(()), Request::new("DELETE", "/api/users/1")).await;
        assert_eq!(res.status_code(), 204);
        assert!(res.body().is_empty());
    }
}
