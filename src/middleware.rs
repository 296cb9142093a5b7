//! Tower middleware that guards an axum service with a [`CircuitBreaker`].
//!
//! Enable with the `axum` Cargo feature.
//!
//! Each request goes through [`CircuitBreaker::allow`]:
//!
//! * **Rejected**: the inner service is never called; the client gets
//!   `503 Service Unavailable` with a JSON body naming the breaker and its
//!   drop ratio. Failure reasons are left to the breaker's report sink and
//!   never reach the client.
//! * **Admitted**: the request is forwarded. A `5xx` response is reported as a
//!   failure (`"upstream returned <status>"`), anything else as a success. If
//!   the response future is dropped mid-flight the request counts as failed.
//!
//! ## Bypass header
//!
//! Requests carrying the configured bypass header skip the breaker entirely and
//! are not counted. Health checks use this to reach a dependency the breaker is
//! currently shedding.
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use adaptive_circuit_breaker::middleware::BreakerLayer;
//! use adaptive_circuit_breaker::{BreakerConfig, CircuitBreaker};
//!
//! async fn users() -> &'static str { "[]" }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BreakerConfig::builder().name("user-db").build().unwrap();
//!     let breaker = CircuitBreaker::new(config).unwrap();
//!
//!     let app = Router::new()
//!         .route("/users", get(users))
//!         .layer(BreakerLayer::new(breaker).bypass_header("x-health-check-bypass"));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use crate::throttle::PendingOutcome;
use crate::CircuitBreaker;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::{
    convert::Infallible,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ── Layer ────────────────────────────────────────────────────────────────────

/// Tower [`Layer`] that wraps an inner service with breaker enforcement.
#[derive(Clone)]
pub struct BreakerLayer {
    breaker: CircuitBreaker,
    bypass_header: Option<Arc<str>>,
}

impl BreakerLayer {
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self {
            breaker,
            bypass_header: None,
        }
    }

    /// Requests carrying this header skip the breaker.
    pub fn bypass_header(mut self, header: impl Into<String>) -> Self {
        self.bypass_header = Some(Arc::from(header.into()));
        self
    }
}

impl<S> Layer<S> for BreakerLayer {
    type Service = BreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BreakerService {
            inner,
            breaker: self.breaker.clone(),
            bypass_header: self.bypass_header.clone(),
        }
    }
}

// ── Service ──────────────────────────────────────────────────────────────────

/// Tower [`Service`] produced by [`BreakerLayer`].
#[derive(Clone)]
pub struct BreakerService<S> {
    inner: S,
    breaker: CircuitBreaker,
    bypass_header: Option<Arc<str>>,
}

impl<S> Service<Request<Body>> for BreakerService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let breaker = self.breaker.clone();
        let bypass_header = self.bypass_header.clone();
        // poll_ready was called on `self.inner`; swap the ready service into the
        // future and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if let Some(header) = bypass_header {
                if req.headers().contains_key(header.as_ref()) {
                    return inner.call(req).await;
                }
            }

            let promise = match breaker.allow() {
                Ok(promise) => promise,
                // Already reported through the breaker's sink, history included.
                Err(unavailable) => {
                    let name = breaker.name();
                    return Ok((
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({
                            "error": "service_unavailable",
                            "message": format!(
                                "Service '{name}' is temporarily unavailable: {unavailable}"
                            ),
                            "service": name,
                            "drop_ratio": breaker.window_stats().drop_ratio,
                        })),
                    )
                        .into_response());
                }
            };

            let pending = PendingOutcome::new(promise);
            let resp = inner.call(req).await?;
            let status = resp.status();
            pending.settle(!status.is_server_error(), || {
                format!("upstream returned {status}")
            });

            Ok(resp)
        })
    }
}
