//! Leader selection over the children of an election path.

use leadwire_core::{ElectionMember, MemberFormat};
use tracing::{debug, warn};

/// Turns raw child names into election members and picks the leader.
#[derive(Debug, Clone)]
pub struct MemberSelector {
    json_prefix: String,
    binary_prefix: String,
}

impl MemberSelector {
    pub fn new(json_prefix: impl Into<String>, binary_prefix: impl Into<String>) -> Self {
        Self {
            json_prefix: json_prefix.into(),
            binary_prefix: binary_prefix.into(),
        }
    }

    /// Parses `names` into members sorted by ascending sequence token.
    ///
    /// Names matching neither prefix are ignored.
    pub fn members<S: AsRef<str>>(&self, names: &[S]) -> Vec<ElectionMember> {
        let mut members: Vec<ElectionMember> = names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                let member = ElectionMember::parse(name, &self.json_prefix, &self.binary_prefix);
                if member.is_none() {
                    debug!("Ignoring non-member node {}", name);
                }
                member
            })
            .collect();
        members.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.name.cmp(&b.name)));
        members
    }

    /// Picks the leader among `names`.
    ///
    /// The lowest-token JSON member wins. Binary members are only considered
    /// when no JSON member exists.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Option<ElectionMember> {
        let members = self.members(names);

        if let Some(member) = members.iter().find(|m| m.format == MemberFormat::Json) {
            return Some(member.clone());
        }

        let member = members.into_iter().next()?;
        warn!(
            "Leader {} publishes the legacy binary format, consider upgrading it",
            member.name
        );
        Some(member)
    }
}
