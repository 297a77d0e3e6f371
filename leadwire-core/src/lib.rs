//! # Leadwire Core
//!
//! Shared building blocks for the leadwire control-plane connector.
//!
//! This crate provides:
//! - **Election types**: [`SequenceToken`], [`ElectionMember`], [`LeaderInfo`]
//!   and the watcher's materialized [`LeaderView`]
//! - **Error handling**: the [`CoreError`] taxonomy shared by every crate
//! - **Codec**: readable (JSON) and compact (binary) payload encodings behind
//!   one [`Codec`] value, plus the blanket [`Marshal`]/[`Unmarshal`] capability
//! - **Coordination seam**: the [`coordination::Connector`] and
//!   [`coordination::CoordinationClient`] traits consumed by the leader watcher
//! - **Transport seam**: the [`transport::Transport`] trait consumed by the
//!   session-affine RPC client
//! - **Retry policy**: [`RetryConfig`] with exponential backoff
//!
//! ```rust
//! use leadwire_core::{Codec, LeaderInfo, Marshal, Unmarshal};
//!
//! let info = LeaderInfo::new("leader-1", "10.0.0.1", 5050);
//! let codec = Codec::json();
//! let bytes = info.marshal(&codec).unwrap();
//! let decoded = LeaderInfo::unmarshal(&codec, &bytes).unwrap();
//! assert_eq!(decoded, info);
//! ```

pub mod codec;
pub mod coordination;
pub mod error;
pub mod retry;
pub mod transport;
pub mod types;

pub use codec::{BinaryCodec, Codec, CodecConfig, JsonCodec, Marshal, PayloadCodec, Unmarshal};
pub use error::*;
pub use retry::RetryConfig;
pub use types::*;
