//! Types shared by the data-structure CRDs

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Convergence state of a data-structure config
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DataStructureState {
    /// Not yet submitted, or waiting to resubmit
    #[default]
    Pending,
    /// Accepted by the cluster, not yet confirmed persisted
    Persisting,
    /// Confirmed persisted by read-back
    Persisted,
    /// Cannot converge without a spec change
    Failed,
}

impl DataStructureState {
    /// Whether the persisted config document should include this object
    pub fn is_submitted(self) -> bool {
        matches!(self, Self::Persisting | Self::Persisted)
    }
}

impl std::fmt::Display for DataStructureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Persisting => write!(f, "Persisting"),
            Self::Persisted => write!(f, "Persisted"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status shared by every data-structure kind
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataStructureStatus {
    /// Convergence state
    #[serde(default)]
    pub state: DataStructureState,

    /// Human-readable message about the last outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Outcome of the last submit per member address
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub member_statuses: BTreeMap<String, String>,

    /// Generation this status was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Storage format of entries
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum InMemoryFormat {
    /// Serialized form
    Binary,
    /// Deserialized objects
    Object,
    /// Off-heap storage
    Native,
}

impl InMemoryFormat {
    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "BINARY",
            Self::Object => "OBJECT",
            Self::Native => "NATIVE",
        }
    }
}

/// Value collection used by a multi-map
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CollectionType {
    /// No duplicate values per key
    #[default]
    Set,
    /// Duplicates and insertion order kept
    List,
}

impl CollectionType {
    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "SET",
            Self::List => "LIST",
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_backup_count() -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(DataStructureState::Pending.to_string(), "Pending");
        assert_eq!(DataStructureState::Persisting.to_string(), "Persisting");
        assert_eq!(DataStructureState::Persisted.to_string(), "Persisted");
        assert_eq!(DataStructureState::Failed.to_string(), "Failed");
    }

    #[test]
    fn empty_status_deserializes_to_pending() {
        let status: DataStructureStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status.state, DataStructureState::Pending);
        assert!(status.member_statuses.is_empty());
    }

    #[test]
    fn formats_use_upper_case_on_the_wire() {
        let json = serde_json::to_string(&InMemoryFormat::Object).unwrap();
        assert_eq!(json, "\"OBJECT\"");
        assert_eq!(CollectionType::List.as_str(), "LIST");
    }
}
