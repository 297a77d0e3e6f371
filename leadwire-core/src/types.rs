//! # Core Types
//!
//! Election membership records and the leader view published by the watcher.

use crate::codec::Codec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence number assigned by the coordination service to an election node.
///
/// Tokens are strictly ordered and unique within one election path. The
/// member holding the lowest live token is the leader.
///
/// # Examples
///
/// ```rust
/// use leadwire_core::SequenceToken;
///
/// let first = SequenceToken::new(5);
/// let second = SequenceToken::new(10);
/// assert!(first < second);
/// assert_eq!(first.to_string(), "0000000005");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceToken(pub u64);

impl SequenceToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Coordination services render sequential suffixes as ten digits
        write!(f, "{:010}", self.0)
    }
}

/// Encoding of the leader-info payload stored in an election node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberFormat {
    /// Readable JSON payload (`json.info_` nodes)
    Json,
    /// Compact binary payload (`info_` nodes)
    Binary,
}

impl MemberFormat {
    /// Codec able to decode payloads of this format.
    pub fn codec(&self) -> Codec {
        match self {
            Self::Json => Codec::json(),
            Self::Binary => Codec::binary(),
        }
    }
}

impl fmt::Display for MemberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberFormat::Json => write!(f, "json"),
            MemberFormat::Binary => write!(f, "binary"),
        }
    }
}

/// One candidate's published record under an election path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionMember {
    /// Node name relative to the election path
    pub name: String,
    /// Sequence token parsed from the node name
    pub sequence: SequenceToken,
    /// Payload encoding implied by the name prefix
    pub format: MemberFormat,
}

impl ElectionMember {
    pub fn new(name: impl Into<String>, sequence: SequenceToken, format: MemberFormat) -> Self {
        Self {
            name: name.into(),
            sequence,
            format,
        }
    }

    /// Parses a node name of the form `<prefix><digits>`.
    ///
    /// The JSON prefix is tried first because the binary prefix is usually a
    /// suffix of it (`json.info_` vs `info_`).
    ///
    /// ```rust
    /// use leadwire_core::{ElectionMember, MemberFormat};
    ///
    /// let member = ElectionMember::parse("json.info_0000000007", "json.info_", "info_").unwrap();
    /// assert_eq!(member.sequence.value(), 7);
    /// assert_eq!(member.format, MemberFormat::Json);
    ///
    /// assert!(ElectionMember::parse("log_replicas", "json.info_", "info_").is_none());
    /// ```
    pub fn parse(name: &str, json_prefix: &str, binary_prefix: &str) -> Option<Self> {
        let (format, suffix) = if let Some(rest) = name.strip_prefix(json_prefix) {
            (MemberFormat::Json, rest)
        } else if let Some(rest) = name.strip_prefix(binary_prefix) {
            (MemberFormat::Binary, rest)
        } else {
            return None;
        };

        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let sequence = suffix.parse::<u64>().ok()?;
        Some(Self::new(name, SequenceToken::new(sequence), format))
    }
}

/// Leader-info payload published by a candidate in its election node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderInfo {
    /// Unique identity of the leader process
    pub id: String,
    /// Host name or IP the leader serves on
    pub hostname: String,
    /// Port the leader serves on
    pub port: u16,
    /// Process identifier of the form `name@host:port`
    #[serde(default)]
    pub pid: Option<String>,
    /// Software version of the leader
    #[serde(default)]
    pub version: Option<String>,
}

impl LeaderInfo {
    pub fn new(id: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            hostname: hostname.into(),
            port,
            pid: None,
            version: None,
        }
    }

    pub fn with_pid(mut self, pid: impl Into<String>) -> Self {
        self.pid = Some(pid.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Address the RPC client should target, as `host:port`.
    ///
    /// Falls back to the address embedded in `pid` when no hostname was
    /// published.
    ///
    /// ```rust
    /// use leadwire_core::LeaderInfo;
    ///
    /// let info = LeaderInfo::new("m1", "10.0.0.1", 5050);
    /// assert_eq!(info.host_port().as_deref(), Some("10.0.0.1:5050"));
    ///
    /// let info = LeaderInfo::new("m2", "", 0).with_pid("master@10.0.0.2:5051");
    /// assert_eq!(info.host_port().as_deref(), Some("10.0.0.2:5051"));
    /// ```
    pub fn host_port(&self) -> Option<String> {
        if !self.hostname.is_empty() {
            if self.hostname.contains(':') && !self.hostname.starts_with('[') {
                return Some(format!("[{}]:{}", self.hostname, self.port));
            }
            return Some(format!("{}:{}", self.hostname, self.port));
        }

        self.pid
            .as_deref()
            .and_then(|pid| pid.split_once('@'))
            .map(|(_, address)| address.to_string())
            .filter(|address| !address.is_empty())
    }
}

/// The elected member together with its decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leader {
    pub member: ElectionMember,
    pub info: LeaderInfo,
}

/// The watcher's materialized belief about cluster leadership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderView {
    /// No live election member
    Absent,
    /// The live member with the lowest sequence token
    Present(Leader),
}

impl LeaderView {
    pub fn present(member: ElectionMember, info: LeaderInfo) -> Self {
        Self::Present(Leader { member, info })
    }

    /// Sequence token of the leader, `None` when absent.
    pub fn token(&self) -> Option<SequenceToken> {
        match self {
            LeaderView::Absent => None,
            LeaderView::Present(leader) => Some(leader.member.sequence),
        }
    }

    pub fn leader(&self) -> Option<&Leader> {
        match self {
            LeaderView::Absent => None,
            LeaderView::Present(leader) => Some(leader),
        }
    }

    pub fn info(&self) -> Option<&LeaderInfo> {
        self.leader().map(|leader| &leader.info)
    }

    pub fn is_present(&self) -> bool {
        matches!(self, LeaderView::Present(_))
    }

    /// Identity comparison by sequence token; payloads are ignored.
    pub fn same_leader(&self, other: &LeaderView) -> bool {
        self.token() == other.token()
    }
}

impl fmt::Display for LeaderView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaderView::Absent => write!(f, "<none>"),
            LeaderView::Present(leader) => write!(
                f,
                "{} ({})",
                leader.info.id,
                leader.member.name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binary_member() {
        let member = ElectionMember::parse("info_005", "json.info_", "info_").unwrap();
        assert_eq!(member.sequence, SequenceToken::new(5));
        assert_eq!(member.format, MemberFormat::Binary);
        assert_eq!(member.name, "info_005");
    }

    #[test]
    fn test_parse_rejects_malformed_suffix() {
        assert!(ElectionMember::parse("info_", "json.info_", "info_").is_none());
        assert!(ElectionMember::parse("info_12a", "json.info_", "info_").is_none());
        assert!(ElectionMember::parse("info_-3", "json.info_", "info_").is_none());
        assert!(ElectionMember::parse("json.info_", "json.info_", "info_").is_none());
    }

    #[test]
    fn test_host_port_requires_address() {
        let info = LeaderInfo::new("m", "", 5050);
        assert_eq!(info.host_port(), None);

        let info = LeaderInfo::new("m", "", 5050).with_pid("master");
        assert_eq!(info.host_port(), None);
    }

    #[test]
    fn test_host_port_brackets_ipv6() {
        let info = LeaderInfo::new("m", "::1", 5050);
        assert_eq!(info.host_port().as_deref(), Some("[::1]:5050"));

        let info = LeaderInfo::new("m", "[fe80::2]", 5051);
        assert_eq!(info.host_port().as_deref(), Some("[fe80::2]:5051"));
    }

    #[test]
    fn test_view_display() {
        assert_eq!(LeaderView::Absent.to_string(), "<none>");

        let member = ElectionMember::new("info_7", SequenceToken::new(7), MemberFormat::Binary);
        let view = LeaderView::present(member, LeaderInfo::new("master@a", "a", 1));
        assert_eq!(view.to_string(), "master@a (info_7)");
        assert_eq!(view.token(), Some(SequenceToken::new(7)));
    }
}
