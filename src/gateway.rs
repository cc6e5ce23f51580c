//! Chat gateway: validation, quota and timeout in front of the remote explanation service.
//!
//! The gateway is transport-agnostic. Anything implementing
//! `tower_service::Service<ChatRequest, Response = ChatResponse>` can sit underneath it; the
//! `flashdeck-http` crate provides the reqwest-backed one.
//!
//! ```rust
//! use flashdeck::gateway::{ChatGateway, ChatRequest, ChatResponse};
//! use flashdeck::error::TransportError;
//! use flashdeck::kv::InMemoryStore;
//! use flashdeck::rate_limit::TieredRateLimiter;
//! use tower::service_fn;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = service_fn(|req: ChatRequest| async move {
//!     Ok::<_, TransportError>(ChatResponse { response: format!("explained: {}", req.message) })
//! });
//! let gateway = ChatGateway::new(transport, TieredRateLimiter::new(InMemoryStore::new()));
//!
//! let reply = gateway.send_chat_message("  hola  ").await.unwrap();
//! assert_eq!(reply.response, "explained: hola");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, warn};

use crate::error::{ConfigError, GatewayError, StoreError, ValidationError};
use crate::kv::KeyValueStore;
use crate::rate_limit::middleware::DEFAULT_TIMEOUT;
use crate::rate_limit::{
    RateLimitLayer, RateLimitService, RateLimitStatus, RateLimiter, TieredRateLimiter, UsageStats,
    DEFAULT_ENDPOINT,
};
use crate::timeout::TimeoutPolicy;

/// Default remote service root.
pub const DEFAULT_BASE_URL: &str = "https://spanish-flashcards-api.vercel.app/api";

const ENV_API_URL: &str = "FLASHDECK_API_URL";
const ENV_API_KEY: &str = "FLASHDECK_API_KEY";
const ENV_TIMEOUT_MS: &str = "FLASHDECK_TIMEOUT_MS";

/// Body sent to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Body expected back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Where and how to reach the remote service.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    base_url: String,
    api_key: String,
    timeout: Duration,
    endpoint: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GatewayConfig {
    /// Config for the default service with the given bearer token.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Read `FLASHDECK_API_URL`, `FLASHDECK_API_KEY` and `FLASHDECK_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY).ok_or(ConfigError::MissingApiKey)?;
        let mut config = Self::new(api_key)?;

        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            config = config.with_base_url(url);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var: ENV_TIMEOUT_MS, value: raw.clone() })?;
            config = config.with_timeout(Duration::from_millis(millis))?;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-call bound. Must be non-zero.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() || timeout == Duration::MAX {
            return Err(ConfigError::InvalidTimeout);
        }
        self.timeout = timeout;
        Ok(self)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Full URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.endpoint)
    }
}

/// Front door for chat calls.
///
/// Cheap to clone; clones share the limiter.
pub struct ChatGateway<T, L> {
    service: RateLimitService<T, L>,
    limiter: Arc<L>,
    endpoint: String,
}

impl<T: Clone, L> Clone for ChatGateway<T, L> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            limiter: self.limiter.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl<T, L> ChatGateway<T, L>
where
    T: Service<ChatRequest, Response = ChatResponse> + Clone + Send + 'static,
    T::Future: Send + 'static,
    T::Error: Into<GatewayError> + Send + 'static,
    L: RateLimiter + 'static,
{
    /// Gateway with the default endpoint and a 10 s timeout.
    pub fn new(transport: T, limiter: L) -> Self {
        Self::from_layer(transport, RateLimitLayer::new(limiter), DEFAULT_ENDPOINT)
    }

    /// Gateway using the endpoint and timeout from `config`.
    pub fn with_config(transport: T, limiter: L, config: &GatewayConfig) -> Self {
        let layer = RateLimitLayer::new(limiter)
            .with_endpoint(config.endpoint())
            .with_timeout(TimeoutPolicy::new(config.timeout()));
        Self::from_layer(transport, layer, config.endpoint())
    }

    fn from_layer(transport: T, layer: RateLimitLayer<L>, endpoint: &str) -> Self {
        Self {
            limiter: layer.limiter().clone(),
            service: layer.layer(transport),
            endpoint: endpoint.to_string(),
        }
    }

    /// Send `message` for explanation.
    ///
    /// Blank messages fail without touching the limiter. Everything else goes through the
    /// quota check, is bounded by the timeout, and is recorded unless the limiter refused it.
    pub async fn send_chat_message(&self, message: &str) -> Result<ChatResponse, GatewayError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let request = ChatRequest { message: message.to_string() };
        let result = self.service.clone().oneshot(request).await;

        match &result {
            Err(GatewayError::RateLimited(e)) => {
                debug!(limit = %e.limit_type, reset_time = e.reset_time, "chat request refused locally");
            }
            Err(e) => warn!(error = %e, endpoint = %self.endpoint, "chat request failed"),
            Ok(_) => debug!(endpoint = %self.endpoint, "chat request completed"),
        }
        result
    }

    /// Quota snapshot for the gateway's endpoint.
    pub async fn rate_limit_status(&self) -> Result<RateLimitStatus, StoreError> {
        self.limiter.check(&self.endpoint).await
    }

    /// The shared limiter.
    pub fn limiter(&self) -> &Arc<L> {
        &self.limiter
    }
}

impl<T, S> ChatGateway<T, TieredRateLimiter<S>>
where
    S: KeyValueStore + 'static,
{
    /// Usage analytics from the limiter's ledger.
    pub async fn usage_stats(&self) -> UsageStats {
        self.limiter.usage_stats().await
    }
}
