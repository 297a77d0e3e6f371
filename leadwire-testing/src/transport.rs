//! Scripted transport for driving the RPC client.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use http::header::LOCATION;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use leadwire_client::SESSION_TOKEN_HEADER;
use leadwire_core::transport::{Body, Request, Response, Transport};
use leadwire_core::{CoreError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Canned reply for one request
#[derive(Debug, Clone)]
pub enum Reply {
    /// `200 OK` with a full body
    Ok(Bytes),
    /// `200 OK` carrying a session token and a streamed body
    Subscribed { token: String, events: Vec<Bytes> },
    /// `200 OK` with a streamed body and no session token
    Stream(Vec<Bytes>),
    /// `307 Temporary Redirect`, optionally with a `Location` hint
    NotLeader { location: Option<String> },
    /// Any other status
    Status(u16),
    /// Transport-level failure
    Fail(String),
    /// Never answers
    Hang,
}

impl Reply {
    pub fn redirect(location: impl Into<String>) -> Self {
        Reply::NotLeader {
            location: Some(location.into()),
        }
    }

    pub fn subscribed(token: impl Into<String>) -> Self {
        Reply::Subscribed {
            token: token.into(),
            events: vec![Bytes::from_static(b"{\"type\":\"SUBSCRIBED\"}\n")],
        }
    }
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Reply>,
    fallback: Option<Reply>,
    requests: Vec<Request>,
}

/// Transport answering from a queue of canned replies.
///
/// When the queue is empty the fallback reply is used, or `503` if none is
/// set. Every request is recorded, and every response counts as opened until
/// it is closed or dropped.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
        let transport = Self::new();
        transport.push_all(replies);
        transport
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().queue.push_back(reply);
    }

    pub fn push_all(&self, replies: impl IntoIterator<Item = Reply>) {
        self.script.lock().queue.extend(replies);
    }

    pub fn set_fallback(&self, reply: Reply) {
        self.script.lock().fallback = Some(reply);
    }

    /// Requests sent so far, oldest first.
    pub fn requests(&self) -> Vec<Request> {
        self.script.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().requests.len()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn respond(&self, status: StatusCode, headers: HeaderMap, body: Body) -> Response {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let closed = Arc::clone(&self.closed);
        Response::new(status, headers, body).on_release(move || {
            closed.fetch_add(1, Ordering::SeqCst);
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| CoreError::internal(format!("bad scripted header {}: {}", value, e)))
}

fn streamed(chunks: Vec<Bytes>) -> Body {
    Body::Stream(Box::pin(stream::iter(chunks.into_iter().map(Ok::<Bytes, CoreError>))))
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let reply = {
            let mut script = self.script.lock();
            debug!("Scripted transport received {} {}", request.method, request.url);
            script.requests.push(request);
            script
                .queue
                .pop_front()
                .or_else(|| script.fallback.clone())
                .unwrap_or(Reply::Status(503))
        };

        match reply {
            Reply::Ok(body) => Ok(self.respond(StatusCode::OK, HeaderMap::new(), Body::Full(body))),
            Reply::Subscribed { token, events } => {
                let mut headers = HeaderMap::new();
                headers.insert(HeaderName::from_static("mesos-stream-id"), header_value(&token)?);
                Ok(self.respond(StatusCode::OK, headers, streamed(events)))
            }
            Reply::Stream(events) => Ok(self.respond(StatusCode::OK, HeaderMap::new(), streamed(events))),
            Reply::NotLeader { location } => {
                let mut headers = HeaderMap::new();
                if let Some(location) = location {
                    headers.insert(LOCATION, header_value(&location)?);
                }
                Ok(self.respond(StatusCode::TEMPORARY_REDIRECT, headers, Body::Empty))
            }
            Reply::Status(code) => {
                let status = StatusCode::from_u16(code)
                    .map_err(|e| CoreError::internal(format!("bad scripted status {}: {}", code, e)))?;
                Ok(self.respond(status, HeaderMap::new(), Body::Full(Bytes::from_static(b"error"))))
            }
            Reply::Fail(message) => Err(CoreError::connection(message)),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Value of the session header on `request`, if any.
pub fn session_header(request: &Request) -> Option<&str> {
    request
        .headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
}
