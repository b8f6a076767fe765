//! HTTP server and graceful shutdown.
//!
//! On **SIGTERM** or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`; no new connections are made.
//! 2. Lets every in-flight connection task run to completion (unless
//!    graceful shutdown is disabled, in which case they are aborted).
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{DEFAULT_MAX_BODY_BYTES, ServerConfig};
use crate::dispatch::dispatch;
use crate::envelope::Envelope;
use crate::error::{BoxError, Error};
use crate::request::Request;
use crate::response::IntoResponse;
use crate::router::Router;
use crate::status::Status;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    graceful: bool,
    max_body_bytes: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use perch::Server;
    /// let server = Server::bind("0.0.0.0:8787").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let parsed = addr.parse().map_err(|source| Error::Addr {
            addr: addr.to_owned(),
            source,
        })?;
        Ok(Self { addr: parsed, graceful: true, max_body_bytes: DEFAULT_MAX_BODY_BYTES })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, Error> {
        let mut server = Self::bind(&config.addr)?;
        server.graceful = config.graceful_shutdown;
        server.max_body_bytes = config.max_body_bytes;
        Ok(server)
    }

    /// Starts accepting connections and dispatching them through `router`.
    /// `state` is handed to every handler.
    ///
    /// Returns only after shutdown (SIGTERM or Ctrl-C, followed by all
    /// in-flight requests completing when graceful shutdown is on).
    pub async fn serve<S>(self, router: Router<S>, state: S) -> Result<(), Error>
    where
        S: Send + Sync + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        let router = Arc::new(router);
        let state = Arc::new(state);
        let max_body = self.max_body_bytes;

        info!(addr = %self.addr, "perch listening");

        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let state = Arc::clone(&state);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            let state = Arc::clone(&state);
                            async move { handle(router, state, max_body, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        if self.graceful {
            while tasks.join_next().await.is_some() {}
        } else {
            tasks.shutdown().await;
        }

        info!("perch stopped");
        Ok(())
    }
}

// ── Request conversion ────────────────────────────────────────────────────────

/// Buffers the request body (up to `max_body` bytes), runs the request
/// through [`dispatch`], and converts back.
///
/// Infallible: every failure is already an envelope by the time it gets here.
async fn handle<S, B>(
    router: Arc<Router<S>>,
    state: Arc<S>,
    max_body: usize,
    req: http::Request<B>,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, max_body).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(path = %parts.uri.path(), limit = max_body, "request body too large");
            let envelope =
                Envelope::error("Request body too large").with_status(Status::ContentTooLarge);
            return Ok(envelope.into_response().into_http());
        }
        Err(e) => {
            warn!(path = %parts.uri.path(), "failed to read request body: {e}");
            return Ok(Envelope::error("Invalid request body").into_response().into_http());
        }
    };

    let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let request = parts.headers.iter().fold(
        Request::new(parts.method.as_str(), target).with_body(body),
        |req, (name, value)| match value.to_str() {
            Ok(v) => req.with_header(name.as_str(), v),
            Err(_) => req,
        },
    );

    Ok(dispatch(&router, state, request).await.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
