//! Handler trait and type erasure.
//!
//! # Calling convention
//!
//! A handler receives the request (with its path parameters already bound)
//! and a shared handle to the application's capability object `S`, the
//! struct holding whatever clients the handlers need: cache, object store,
//! database. `S` is built once at startup and never mutated through the
//! router.
//!
//! ```text
//! async fn get_user(req: Request, app: Arc<App>) -> Result<Envelope, BoxError>
//! ```
//!
//! Routine outcomes, including validation failures, are `Ok(..)`: an
//! [`Envelope`](crate::Envelope) or a raw [`Response`]. `Err(..)` is reserved
//! for the unexpected and is turned into the generic `500` by the dispatcher.
//!
//! # How async handlers are stored
//!
//! ```text
//! get_user                                   ← user writes this
//!        ↓ router.get("/users/:id", get_user)
//! Arc::new(FnHandler(get_user))              ← BoxedHandler<S> = Arc<dyn ErasedHandler<S>>
//!        ↓
//! handler.call(req, state)  at request time  ← one vtable dispatch
//!        ↓
//! Box::pin(async { get_user(req, state).await.map(IntoResponse::into_response) })
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::BoxError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased handler future.
#[doc(hidden)]
pub type BoxFuture =
    Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler<S> {
    fn call(&self, req: Request, state: Arc<S>) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler<S> = Arc<dyn ErasedHandler<S> + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// Automatically satisfied by any function or closure of the shape
///
/// ```text
/// Fn(Request, Arc<S>) -> impl Future<Output = Result<impl IntoResponse, BoxError>>
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler<S>: private::Sealed<S> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler<S>;
}

mod private {
    pub trait Sealed<S> {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R, S> private::Sealed<S> for F
where
    F: Fn(Request, Arc<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    S: Send + Sync + 'static,
{
}

impl<F, Fut, R, S> Handler<S> for F
where
    F: Fn(Request, Arc<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    S: Send + Sync + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler<S> {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R, S> ErasedHandler<S> for FnHandler<F>
where
    F: Fn(Request, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, state: Arc<S>) -> BoxFuture {
        let fut = (self.0)(req, state);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}
