use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::rate_limit::{Decision, RateLimiter, DEFAULT_ENDPOINT};
use crate::timeout::{Elapsed, TimeoutPolicy};

/// Bound applied to outbound calls unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A layer that gates every call through a [`RateLimiter`] and bounds it with a timeout.
///
/// Admitted calls are recorded whether they succeed, fail or time out. Calls the limiter
/// refuses never reach the inner service and are not recorded.
#[derive(Debug)]
pub struct RateLimitLayer<L> {
    limiter: Arc<L>,
    endpoint: Arc<str>,
    timeout: TimeoutPolicy,
}

impl<L> Clone for RateLimitLayer<L> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            endpoint: self.endpoint.clone(),
            timeout: self.timeout,
        }
    }
}

impl<L> RateLimitLayer<L> {
    /// Create a new rate limit layer for the default endpoint with a 10 s timeout.
    pub fn new(limiter: L) -> Self {
        Self::from_arc(Arc::new(limiter))
    }

    /// Share a limiter that other components also inspect.
    pub fn from_arc(limiter: Arc<L>) -> Self {
        Self {
            limiter,
            endpoint: Arc::from(DEFAULT_ENDPOINT),
            timeout: TimeoutPolicy::new(DEFAULT_TIMEOUT),
        }
    }

    /// Endpoint name written into the ledger.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Arc::from(endpoint.into());
        self
    }

    /// Override the per-call bound.
    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }

    /// The limiter this layer consults.
    pub fn limiter(&self) -> &Arc<L> {
        &self.limiter
    }
}

impl<S, L> Layer<S> for RateLimitLayer<L>
where
    L: RateLimiter + 'static,
{
    type Service = RateLimitService<S, L>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, layer: self.clone() }
    }
}

/// Middleware service produced by [`RateLimitLayer`].
#[derive(Debug)]
pub struct RateLimitService<S, L> {
    inner: S,
    layer: RateLimitLayer<L>,
}

impl<S: Clone, L> Clone for RateLimitService<S, L> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), layer: self.layer.clone() }
    }
}

impl<S, L, Req> Service<Req> for RateLimitService<S, L>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<GatewayError> + Send + 'static,
    L: RateLimiter + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = GatewayError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // Take the service that was driven to readiness and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let layer = self.layer.clone();

        Box::pin(async move {
            let permit = match layer.limiter.acquire(&layer.endpoint).await {
                Ok(Decision::Allowed { permit, .. }) => permit,
                Ok(Decision::Denied(err)) => return Err(GatewayError::RateLimited(err)),
                Err(e) => return Err(GatewayError::Limiter(e)),
            };

            let outcome = layer.timeout.execute(inner.call(req)).await;

            if let Err(e) = layer.limiter.record(permit).await {
                warn!(error = %e, endpoint = %layer.endpoint, "failed to record request");
            }

            match outcome {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(e.into()),
                Err(Elapsed { elapsed, timeout }) => {
                    debug!(?elapsed, ?timeout, "outbound call timed out");
                    Err(GatewayError::Timeout { elapsed, timeout })
                }
            }
        })
    }
}
