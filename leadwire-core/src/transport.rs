//! Transport seam consumed by the session-affine RPC client.
//!
//! This module provides an abstraction over the request/response exchange to
//! enable:
//! - Production use with reqwest (in leadwire-client)
//! - Scripted replies in tests (in leadwire-testing)

use crate::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{BoxStream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Outgoing call
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Bound on the whole exchange, body included
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn post(url: Url) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Response payload
pub enum Body {
    Empty,
    Full(Bytes),
    /// Open body, e.g. a subscription event stream
    Stream(BoxStream<'static, Result<Bytes>>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            Body::Stream(_) => write!(f, "Stream"),
        }
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// Response handle.
///
/// Owns the underlying body. Closing the response, or dropping it, releases
/// the body exactly once.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    release: Option<ReleaseHook>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            headers,
            body,
            release: None,
        }
    }

    /// Registers a hook that runs when the response is released.
    pub fn on_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, `None` when absent or not valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_streamed(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    /// Next chunk of the body, `None` once it is exhausted.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        match &mut self.body {
            Body::Empty => None,
            Body::Full(bytes) if bytes.is_empty() => None,
            Body::Full(bytes) => Some(Ok(std::mem::take(bytes))),
            Body::Stream(stream) => stream.next().await,
        }
    }

    /// Reads the remaining body and releases the response.
    ///
    /// ```rust
    /// use bytes::Bytes;
    /// use http::{HeaderMap, StatusCode};
    /// use leadwire_core::transport::{Body, Response};
    ///
    /// # tokio_test::block_on(async {
    /// let response = Response::new(StatusCode::OK, HeaderMap::new(), Body::Full(Bytes::from_static(b"ok")));
    /// assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"ok"));
    /// # });
    /// ```
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Discards the body and releases the response.
    pub fn close(mut self) {
        self.release_body();
    }

    fn release_body(&mut self) {
        self.body = Body::Empty;
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        self.release_body();
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

/// Sends requests to an RPC endpoint.
///
/// Implementations must not follow redirects themselves: a
/// `307 Temporary Redirect` is the leader-change signal the client acts on.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_release_runs_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let response = Response::new(StatusCode::OK, HeaderMap::new(), Body::Empty)
            .on_release(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        response.close();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        {
            let _response = Response::new(StatusCode::OK, HeaderMap::new(), Body::Empty)
                .on_release(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_body_collects() {
        let chunks: Vec<Result<Bytes>> = vec![Ok(Bytes::from_static(b"12\n")), Ok(Bytes::from_static(b"{}"))];
        let response = Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            Body::Stream(Box::pin(stream::iter(chunks))),
        );
        assert!(response.is_streamed());
        assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"12\n{}"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("mesos-stream-id", HeaderValue::from_static("abc"));
        let response = Response::new(StatusCode::OK, headers, Body::Empty);
        assert_eq!(response.header("Mesos-Stream-Id"), Some("abc"));
        assert_eq!(response.header("Location"), None);
    }
}
