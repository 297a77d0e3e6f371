//! # Leadwire Detector
//!
//! Leader detection over a coordination service that offers ephemeral,
//! sequence-ordered election nodes.
//!
//! Candidates publish a node named `json.info_<seq>` (or the legacy binary
//! `info_<seq>`) under an election path. The node lives as long as its
//! owner's session, so the live member with the lowest sequence token is the
//! leader. [`LeaderWatcher`] follows that path and reports each distinct
//! transition to registered callbacks.
//!
//! ## Components
//!
//! - [`LeaderWatcher`]: watch, recompute and publish loop
//! - [`CoordinationSession`]: owns the ensemble connection and redials it
//!   after session expiry
//! - [`MemberSelector`]: parses member names and picks the leader
//! - [`LeaderChanged`]: callback interface, implemented for closures

pub mod config;
pub mod election;
pub mod errors;
pub mod session;
pub mod subscribers;
pub mod watcher;

pub use config::{DetectorConfig, BINARY_MEMBER_PREFIX, JSON_MEMBER_PREFIX};
pub use election::MemberSelector;
pub use errors::{DetectorError, DetectorResult};
pub use session::CoordinationSession;
pub use subscribers::{DeliveryStats, LeaderChanged, Subscription};
pub use watcher::LeaderWatcher;
