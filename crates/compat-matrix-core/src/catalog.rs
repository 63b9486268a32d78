//! Operation catalog: protocol operation names to numeric API keys.
//!
//! The table is fixed and hand-maintained. Identifiers are not contiguous;
//! the protocol leaves gaps for retired or reserved keys. Lookups never fail:
//! an unknown name resolves to itself so it can still be displayed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Known operations as `(name, api_key)`, sorted by key.
pub const OPERATIONS: &[(&str, u16)] = &[
    ("produce", 0),
    ("fetch", 1),
    ("list_offsets", 2),
    ("metadata", 3),
    ("leader_and_isr", 4),
    ("stop_replica", 5),
    ("update_metadata", 6),
    ("controlled_shutdown", 7),
    ("offset_commit", 8),
    ("offset_fetch", 9),
    ("find_coordinator", 10),
    ("join_group", 11),
    ("heartbeat", 12),
    ("leave_group", 13),
    ("sync_group", 14),
    ("describe_groups", 15),
    ("list_groups", 16),
    ("sasl_handshake", 17),
    ("api_versions", 18),
    ("create_topics", 19),
    ("delete_topics", 20),
    ("delete_records", 21),
    ("init_producer_id", 22),
    ("offset_for_leader_epoch", 23),
    ("add_partitions_to_txn", 24),
    ("add_offsets_to_txn", 25),
    ("end_txn", 26),
    ("write_txn_markers", 27),
    ("txn_offset_commit", 28),
    ("describe_acls", 29),
    ("create_acls", 30),
    ("delete_acls", 31),
    ("describe_configs", 32),
    ("alter_configs", 33),
    ("alter_replica_log_dirs", 34),
    ("describe_log_dirs", 35),
    ("sasl_authenticate", 36),
    ("create_partitions", 37),
    ("create_delegation_token", 38),
    ("renew_delegation_token", 39),
    ("expire_delegation_token", 40),
    ("describe_delegation_token", 41),
    ("delete_groups", 42),
    ("elect_leaders", 43),
    ("incremental_alter_configs", 44),
    ("alter_partition_reassignments", 45),
    ("list_partition_reassignments", 46),
    ("offset_delete", 47),
    ("describe_client_quotas", 48),
    ("alter_client_quotas", 49),
    ("describe_user_scram_credentials", 50),
    ("alter_user_scram_credentials", 51),
    ("alter_partition", 52),
    ("update_features", 53),
    ("envelope", 54),
    ("fetch_snapshot", 55),
    ("describe_cluster", 60),
    ("describe_producers", 61),
    ("broker_registration", 62),
    ("broker_heartbeat", 63),
    ("unregister_broker", 64),
    ("describe_transactions", 65),
    ("list_transactions", 66),
    ("allocate_producer_ids", 67),
    ("consumer_group_heartbeat", 68),
    ("consumer_group_describe", 69),
    ("controller_registration", 70),
    ("get_telemetry_subscriptions", 71),
    ("push_telemetry", 72),
    ("assign_replicas_to_dirs", 73),
    ("list_client_metrics_resources", 74),
    ("describe_topic_partitions", 75),
];

/// Result of resolving an operation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiKey {
    /// Name found in the catalog.
    Known(u16),
    /// Name not in the catalog; kept verbatim for display only.
    Unknown(String),
}

impl ApiKey {
    pub fn id(&self) -> Option<u16> {
        match self {
            ApiKey::Known(id) => Some(*id),
            ApiKey::Unknown(_) => None,
        }
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKey::Known(id) => write!(f, "{}", id),
            ApiKey::Unknown(name) => f.write_str(name),
        }
    }
}

/// Resolve an operation name (case-insensitive) to its API key.
///
/// Unknown names come back unchanged as [`ApiKey::Unknown`].
pub fn name_to_id(name: &str) -> ApiKey {
    let lower = name.to_ascii_lowercase();
    OPERATIONS
        .iter()
        .find(|(n, _)| *n == lower)
        .map(|(_, id)| ApiKey::Known(*id))
        .unwrap_or_else(|| ApiKey::Unknown(name.to_string()))
}

/// Resolve an API key to its operation name, or the decimal id if unknown.
pub fn id_to_name(id: u16) -> String {
    OPERATIONS
        .iter()
        .find(|(_, i)| *i == id)
        .map(|(n, _)| (*n).to_string())
        .unwrap_or_else(|| id.to_string())
}

/// `name(id)` label used in operation lists.
pub fn label(name: &str) -> String {
    format!("{}({})", name, name_to_id(name))
}

/// One row of the catalog reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub api_key: u16,
}

/// The full catalog as owned reference rows, sorted by key.
pub fn reference_table() -> Vec<CatalogEntry> {
    OPERATIONS
        .iter()
        .map(|(name, id)| CatalogEntry {
            name: (*name).to_string(),
            api_key: *id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_to_id_known() {
        assert_eq!(name_to_id("produce"), ApiKey::Known(0));
        assert_eq!(name_to_id("describe_cluster"), ApiKey::Known(60));
    }

    #[test]
    fn test_name_to_id_is_case_insensitive() {
        assert_eq!(name_to_id("API_VERSIONS"), ApiKey::Known(18));
        assert_eq!(name_to_id("Metadata"), ApiKey::Known(3));
    }

    #[test]
    fn test_name_to_id_unknown_is_identity() {
        assert_eq!(
            name_to_id("SomeFutureApi"),
            ApiKey::Unknown("SomeFutureApi".to_string())
        );
        assert_eq!(name_to_id("SomeFutureApi").to_string(), "SomeFutureApi");
    }

    #[test]
    fn test_id_to_name() {
        assert_eq!(id_to_name(1), "fetch");
        assert_eq!(id_to_name(75), "describe_topic_partitions");
    }

    #[test]
    fn test_id_to_name_gap_falls_back_to_number() {
        // 56..=59 are not assigned in the table.
        assert_eq!(id_to_name(57), "57");
        assert_eq!(id_to_name(999), "999");
    }

    #[test]
    fn test_table_is_sorted_and_unique() {
        for pair in OPERATIONS.windows(2) {
            assert!(pair[0].1 < pair[1].1, "{:?} !< {:?}", pair[0], pair[1]);
        }
        assert_eq!(reference_table().len(), OPERATIONS.len());
    }

    #[test]
    fn test_label() {
        assert_eq!(label("produce"), "produce(0)");
        assert_eq!(label("mystery"), "mystery(mystery)");
    }

    #[test]
    fn test_api_key_serializes_untagged() {
        assert_eq!(serde_json::to_string(&ApiKey::Known(3)).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&ApiKey::Unknown("x".into())).unwrap(),
            "\"x\""
        );
    }
}
