//! # Leadwire Client
//!
//! Session-affine RPC client for a cluster resource manager's leader.
//!
//! The client keeps a target endpoint, default headers and, once a
//! subscription was established, the server-issued session token. Every call
//! goes through a redirect loop: a `307 Temporary Redirect` means the target
//! is not the leader, and its `Location` hint names the node to retry against.
//!
//! ```rust,no_run
//! use leadwire_client::{Client, ClientConfig, ReqwestTransport};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let client = Client::new(transport, ClientConfig::new("http://127.0.0.1:5050/api/v1/scheduler"))?;
//!
//! let subscribe = serde_json::json!({"type": "SUBSCRIBE"});
//! let (events, token) = client.subscribe(&subscribe).await?;
//! token.apply(&client);
//!
//! client.call_no_data(&serde_json::json!({"type": "REVIVE"})).await?;
//! # drop(events);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod redirect;
pub mod session;
pub mod transport;

pub use client::{Client, ClientOpt, ClientStats};
pub use config::{ClientConfig, DEFAULT_MAX_REDIRECTS, SESSION_TOKEN_HEADER};
pub use errors::{ClientError, ClientResult, ErrorKind};
pub use redirect::resolve_redirect;
pub use session::SessionToken;
pub use transport::ReqwestTransport;
