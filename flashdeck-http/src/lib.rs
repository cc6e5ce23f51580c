//! HTTP transport for the flashdeck chat gateway.
//! POSTs `{"message": ...}` as JSON with a bearer token; expects `{"response": ...}` back.

use flashdeck::error::{BoxError, TransportError};
use flashdeck::gateway::{ChatGateway, ChatRequest, ChatResponse, GatewayConfig};
use flashdeck::rate_limit::RateLimiter;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct HttpChatTransport {
    client: reqwest::Client,
    url: Arc<str>,
    api_key: Arc<str>,
}

impl HttpChatTransport {
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Reuse an existing client (connection pool, proxy settings, ...).
    pub fn with_client(client: reqwest::Client, config: &GatewayConfig) -> Self {
        Self { client, url: config.chat_url().into(), api_key: config.api_key().into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Gateway over HTTP using the endpoint and timeout from `config`.
pub fn chat_gateway<L>(config: &GatewayConfig, limiter: L) -> ChatGateway<HttpChatTransport, L>
where
    L: RateLimiter + 'static,
{
    ChatGateway::with_config(HttpChatTransport::new(config), limiter, config)
}

impl tower_service::Service<ChatRequest> for HttpChatTransport {
    type Response = ChatResponse;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<ChatResponse, TransportError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ChatRequest) -> Self::Future {
        let request = self.client.post(&*self.url).bearer_auth(&*self.api_key).json(&req);
        let url = self.url.clone();
        Box::pin(async move {
            let resp = request.send().await.map_err(network)?;
            let status = resp.status();
            if !status.is_success() {
                debug!(url = %url, status = status.as_u16(), "chat endpoint returned an error");
                return Err(TransportError::Http { status: status.as_u16() });
            }
            let body = resp.text().await.map_err(network)?;
            serde_json::from_str::<ChatResponse>(&body)
                .map_err(|e| TransportError::Decode(e.to_string()))
        })
    }
}

fn network(e: reqwest::Error) -> TransportError {
    TransportError::Network(BoxError::from(e))
}
