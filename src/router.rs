//! Route table and first-match lookup.
//!
//! One ordered list of routes per method. Lookup walks the list in
//! registration order and takes the first pattern that matches. There is no
//! specificity ranking: a literal route registered after a parameter route
//! that covers the same path is never reached. Register the most specific
//! routes first.
//!
//! Duplicate patterns are accepted. The earlier registration wins and the
//! later one is dead.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::pattern::{Params, Pattern};

/// One registration: a pattern bound to a handler.
pub struct Route<S> {
    pattern: Pattern,
    handler: BoxedHandler<S>,
}

impl<S> Route<S> {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub(crate) fn handler(&self) -> BoxedHandler<S> {
        Arc::clone(&self.handler)
    }
}

/// The outcome of a successful lookup.
pub struct Matched<'r, S> {
    pub route: &'r Route<S>,
    pub params: Params,
}

/// The application router.
///
/// Build it once at startup with explicit, ordered calls; pass it to
/// [`Server::serve`](crate::Server::serve). It is never modified afterwards,
/// so concurrent requests read it without locking.
///
/// `S` is the capability object every handler receives.
pub struct Router<S = ()> {
    routes: HashMap<Method, Vec<Route<S>>>,
}

impl<S: Send + Sync + 'static> Router<S> {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + pattern pair. Returns `self` for chaining.
    ///
    /// Parameters use `:name` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use perch::{BoxError, Envelope, Method, Request, Router};
    /// # async fn get_user(_: Request, _: Arc<()>) -> Result<Envelope, BoxError> { Ok(Envelope::success(())) }
    /// # async fn create_user(_: Request, _: Arc<()>) -> Result<Envelope, BoxError> { Ok(Envelope::success(())) }
    /// Router::new()
    ///     .on(Method::Get,  "/users/:id", get_user)
    ///     .on(Method::Post, "/users",     create_user);
    /// ```
    pub fn on(mut self, method: Method, pattern: &str, handler: impl Handler<S>) -> Self {
        self.routes.entry(method).or_default().push(Route {
            pattern: Pattern::parse(pattern),
            handler: handler.into_boxed_handler(),
        });
        self
    }

    pub fn get(self, pattern: &str, handler: impl Handler<S>) -> Self {
        self.on(Method::Get, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler<S>) -> Self {
        self.on(Method::Post, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler<S>) -> Self {
        self.on(Method::Put, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler<S>) -> Self {
        self.on(Method::Delete, pattern, handler)
    }
}

impl<S> Router<S> {
    /// Finds the first route registered for `method` whose pattern matches `path`.
    pub fn lookup(&self, method: Method, path: &str) -> Option<Matched<'_, S>> {
        self.routes
            .get(&method)?
            .iter()
            .find_map(|route| {
                route.pattern.matches(path).map(|params| Matched { route, params })
            })
    }

    /// Routes registered for `method`, in precedence order.
    pub fn routes(&self, method: Method) -> &[Route<S>] {
        self.routes.get(&method).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl<S: Send + Sync + 'static> Default for Router<S> {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::request::Request;

    async fn noop(_req: Request, _state: Arc<()>) -> Result<&'static str, BoxError> {
        Ok("")
    }

    fn same_route<S>(a: &Route<S>, b: &Route<S>) -> bool {
        std::ptr::eq(a, b)
    }

    #[test]
    fn binds_params_on_lookup() {
        let router = Router::new().get("/api/users/:id", noop);
        let m = router.lookup(Method::Get, "/api/users/42").unwrap();
        assert_eq!(m.route.pattern().as_str(), "/api/users/:id");
        assert_eq!(m.params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn method_is_part_of_the_key() {
        let router = Router::new().get("/api/users/:id", noop);
        assert!(router.lookup(Method::Delete, "/api/users/42").is_none());
        assert!(router.lookup(Method::Post, "/api/users/42").is_none());
    }

    #[test]
    fn unknown_path_is_none() {
        let router = Router::new().get("/api/users/:id", noop).get("/health", noop);
        assert!(router.lookup(Method::Get, "/no/such/path").is_none());
        assert!(router.lookup(Method::Get, "/api/users").is_none());
    }

    #[test]
    fn earlier_param_route_shadows_later_literal_route() {
        let router = Router::new()
            .get("/api/users/:id", noop)
            .get("/api/users/special", noop);

        let m = router.lookup(Method::Get, "/api/users/special").unwrap();
        assert_eq!(m.route.pattern().as_str(), "/api/users/:id");
        assert_eq!(m.params["id"], "special");
        assert!(same_route(m.route, &router.routes(Method::Get)[0]));
    }

    #[test]
    fn literal_first_takes_precedence_when_registered_first() {
        let router = Router::new()
            .get("/api/users/special", noop)
            .get("/api/users/:id", noop);

        let m = router.lookup(Method::Get, "/api/users/special").unwrap();
        assert_eq!(m.route.pattern().as_str(), "/api/users/special");
        assert!(m.params.is_empty());

        let m = router.lookup(Method::Get, "/api/users/7").unwrap();
        assert_eq!(m.route.pattern().as_str(), "/api/users/:id");
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let router = Router::new()
            .put("/api/cached/:key", noop)
            .put("/api/cached/:key", noop);

        let routes = router.routes(Method::Put);
        assert_eq!(routes.len(), 2);
        let m = router.lookup(Method::Put, "/api/cached/k").unwrap();
        assert!(same_route(m.route, &routes[0]));
        assert!(!same_route(m.route, &routes[1]));
    }

    #[test]
    fn every_route_resolves_to_itself() {
        let patterns = [
            "/",
            "/health",
            "/api/users",
            "/api/users/:id",
            "/api/users/:id/posts",
            "/api/users/:id/posts/:post",
            "/api/cached/:key",
            "/api/files/:key",
            "/api/compute/statistics",
            "/api/compute/normalize",
            "/api/predict",
        ];
        let example = |p: &str| p.replace(":id", "42").replace(":post", "7").replace(":key", "k1");

        let mut router = Router::new();
        for p in patterns {
            router = router.get(p, noop);
        }

        let routes = router.routes(Method::Get);
        assert_eq!(routes.len(), patterns.len());
        for (i, p) in patterns.iter().enumerate() {
            let m = router.lookup(Method::Get, &example(p)).unwrap();
            assert!(same_route(m.route, &routes[i]), "{p} resolved to {}", m.route.pattern());
        }
    }

    #[test]
    fn routes_for_unregistered_method_is_empty() {
        let router: Router = Router::new();
        assert!(router.routes(Method::Get).is_empty());
    }
}
