//! Sync-state classification between local files and the cloud graph.
//!
//! The state of a node is a pure function of both sides' content hashes and
//! modification times relative to the last successful sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Divergence of one node between its local and cloud representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    Synced,
    /// Changed locally; needs push.
    LocalOnly,
    /// Changed in the cloud (or the local copy is stale); needs pull.
    CloudOnly,
    /// Changed on both sides; needs a human or policy decision.
    Conflict,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::LocalOnly => "local-only",
            Self::CloudOnly => "cloud-only",
            Self::Conflict => "conflict",
        }
    }

    pub fn needs_push(&self) -> bool {
        matches!(self, Self::LocalOnly)
    }

    pub fn needs_pull(&self) -> bool {
        matches!(self, Self::CloudOnly)
    }
}

/// Content hash and modification time of one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideSnapshot {
    pub hash: String,
    pub updated_at: DateTime<Utc>,
}

impl SideSnapshot {
    pub fn new(hash: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            hash: hash.into(),
            updated_at,
        }
    }

    fn changed_since(&self, last_synced_at: Option<DateTime<Utc>>) -> bool {
        match last_synced_at {
            Some(synced) => self.updated_at > synced,
            None => true,
        }
    }
}

/// Classify a node from its local snapshot, cloud snapshot and last sync time.
///
/// | hashes | local changed | cloud changed | state |
/// |---|---|---|---|
/// | equal | - | - | synced |
/// | differ | yes | no | local-only |
/// | differ | no | yes | cloud-only |
/// | differ | yes | yes | conflict |
/// | differ | no | no | cloud-only (stale local copy) |
///
/// With only one side present, a local node is `local-only`; a cloud node is
/// `cloud-only` if it changed after the last sync, `synced` otherwise.
pub fn classify(
    local: Option<&SideSnapshot>,
    cloud: Option<&SideSnapshot>,
    last_synced_at: Option<DateTime<Utc>>,
) -> SyncState {
    match (local, cloud) {
        (None, None) => SyncState::Synced,
        (Some(_), None) => SyncState::LocalOnly,
        (None, Some(cloud)) => {
            if cloud.changed_since(last_synced_at) {
                SyncState::CloudOnly
            } else {
                SyncState::Synced
            }
        }
        (Some(local), Some(cloud)) => {
            if local.hash == cloud.hash {
                return SyncState::Synced;
            }
            match (
                local.changed_since(last_synced_at),
                cloud.changed_since(last_synced_at),
            ) {
                (true, false) => SyncState::LocalOnly,
                (false, true) => SyncState::CloudOnly,
                (true, true) => SyncState::Conflict,
                (false, false) => SyncState::CloudOnly,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-11-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(minutes)
    }

    #[test]
    fn test_equal_hashes_are_synced_regardless_of_times() {
        let local = SideSnapshot::new("a", at(30));
        let cloud = SideSnapshot::new("a", at(40));
        assert_eq!(classify(Some(&local), Some(&cloud), Some(at(0))), SyncState::Synced);
        assert_eq!(classify(Some(&local), Some(&cloud), None), SyncState::Synced);
    }

    #[test]
    fn test_only_local_advanced_is_local_only() {
        let local = SideSnapshot::new("A", at(10));
        let cloud = SideSnapshot::new("B", at(-5));
        assert_eq!(classify(Some(&local), Some(&cloud), Some(at(0))), SyncState::LocalOnly);
    }

    #[test]
    fn test_only_cloud_advanced_is_cloud_only() {
        let local = SideSnapshot::new("A", at(-5));
        let cloud = SideSnapshot::new("B", at(10));
        assert_eq!(classify(Some(&local), Some(&cloud), Some(at(0))), SyncState::CloudOnly);
    }

    #[test]
    fn test_both_advanced_is_conflict() {
        let local = SideSnapshot::new("A", at(10));
        let cloud = SideSnapshot::new("B", at(20));
        assert_eq!(classify(Some(&local), Some(&cloud), Some(at(0))), SyncState::Conflict);
        // Never synced and both sides differ.
        assert_eq!(classify(Some(&local), Some(&cloud), None), SyncState::Conflict);
    }

    #[test]
    fn test_stale_local_copy_pulls() {
        let local = SideSnapshot::new("A", at(-10));
        let cloud = SideSnapshot::new("B", at(-5));
        assert_eq!(classify(Some(&local), Some(&cloud), Some(at(0))), SyncState::CloudOnly);
    }

    #[test]
    fn test_one_sided_nodes() {
        let snap = SideSnapshot::new("A", at(5));
        assert_eq!(classify(Some(&snap), None, Some(at(0))), SyncState::LocalOnly);
        assert_eq!(classify(None, Some(&snap), Some(at(0))), SyncState::CloudOnly);
        assert_eq!(classify(None, Some(&snap), Some(at(10))), SyncState::Synced);
        assert_eq!(classify(None, Some(&snap), None), SyncState::CloudOnly);
        assert_eq!(classify(None, None, None), SyncState::Synced);
    }

    #[test]
    fn test_state_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&SyncState::LocalOnly).unwrap(), "\"local-only\"");
        assert_eq!(SyncState::CloudOnly.as_str(), "cloud-only");
        assert!(SyncState::LocalOnly.needs_push());
        assert!(!SyncState::Conflict.needs_pull());
    }
}
