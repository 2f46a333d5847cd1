//! Request middleware
//!
//! An ordered list of [`Interceptor`]s wrapped around an endpoint. The first
//! interceptor in the list is the outermost: it sees the request first and
//! the response last.
//!
//! ```text
//! compose(endpoint, [logger, recover, rate_limit])
//!
//! request  --> logger --> recover --> rate_limit --> endpoint
//! response <-- logger <-- recover <-- rate_limit <--
//! ```
//!
//! Order is significant: panic recovery must be listed before anything whose
//! panics it should catch, including the rate limiter.

pub mod logging;
pub mod rate_limit;
pub mod recover;

pub use logging::RequestLogger;
pub use rate_limit::RateLimitInterceptor;
pub use recover::RecoverPanic;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};

/// A single link in the middleware chain.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &str;

    /// Handle `req`, either answering it directly or passing it on with
    /// `next.run(req)`.
    async fn intercept(&self, req: Request<Body>, next: Next<'_>) -> Response;
}

/// The rest of the chain after the current interceptor.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Interceptor>],
    endpoint: &'a Router,
}

impl Next<'_> {
    /// Forward the request to the next interceptor, or to the endpoint once
    /// the chain is exhausted.
    pub async fn run(self, req: Request<Body>) -> Response {
        match self.remaining.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    remaining: rest,
                    endpoint: self.endpoint,
                };
                current.intercept(req, next).await
            }
            None => match self.endpoint.clone().oneshot(req).await {
                Ok(response) => response,
                Err(never) => match never {},
            },
        }
    }
}

struct PipelineInner {
    interceptors: Vec<Arc<dyn Interceptor>>,
    endpoint: Router,
}

/// An endpoint with its interceptors applied. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

/// Wrap `endpoint` in `interceptors`, first listed outermost.
pub fn compose(endpoint: Router, interceptors: Vec<Arc<dyn Interceptor>>) -> Pipeline {
    Pipeline {
        inner: Arc::new(PipelineInner {
            interceptors,
            endpoint,
        }),
    }
}

impl Pipeline {
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let next = Next {
            remaining: &self.inner.interceptors,
            endpoint: &self.inner.endpoint,
        };
        next.run(req).await
    }

    /// Interceptor names, outermost first
    pub fn names(&self) -> Vec<&str> {
        self.inner
            .interceptors
            .iter()
            .map(|interceptor| interceptor.name())
            .collect()
    }
}

impl Service<Request<Body>> for Pipeline {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let pipeline = self.clone();
        Box::pin(async move { Ok(pipeline.handle(req).await) })
    }
}
