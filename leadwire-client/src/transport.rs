//! Production transport over reqwest.

use async_trait::async_trait;
use futures_util::StreamExt;
use leadwire_core::transport::{Body, Request, Response, Transport};
use leadwire_core::{CoreError, Result};
use reqwest::redirect::Policy;
use std::time::Duration;

/// Transport backed by a `reqwest::Client`.
///
/// Automatic redirect following is disabled so that `307` responses reach
/// the client's redirect loop.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(Duration::from_secs(10))
    }

    pub fn with_connect_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(timeout)
            .build()
            .map_err(|e| CoreError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wraps a preconfigured client. It must not follow redirects.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map(|chunk| chunk.map_err(transport_error));

        Ok(Response::new(status, headers, Body::Stream(Box::pin(body))))
    }
}

fn transport_error(err: reqwest::Error) -> CoreError {
    if err.is_timeout() {
        CoreError::timeout(format!("HTTP exchange: {}", err))
    } else {
        CoreError::connection(format!("HTTP request failed: {}", err))
    }
}
