//! Last-successful-spec annotation
//!
//! The annotation holds the JSON form of the spec that was last observed
//! persisted on the cluster. It is written only when a resource reaches its
//! success state and is the baseline for update validation.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result};

/// Annotation key holding the last spec observed persisted
pub const LAST_SUCCESSFUL_SPEC_ANNOTATION: &str = "hazelcast.com/last-successful-spec";

/// Serialize a spec into its annotation value
pub fn encode_spec<S: Serialize>(spec: &S) -> Result<String> {
    serde_json::to_string(spec).map_err(|e| Error::serialization(e.to_string()))
}

/// Read the last successful spec from an object's annotations.
///
/// Returns `Ok(None)` when nothing has converged yet. A value that does not
/// parse is an internal error, not "no prior state".
pub fn last_successful_spec<S: DeserializeOwned>(
    annotations: Option<&BTreeMap<String, String>>,
) -> Result<Option<S>> {
    let Some(raw) = annotations.and_then(|a| a.get(LAST_SUCCESSFUL_SPEC_ANNOTATION)) else {
        return Ok(None);
    };
    serde_json::from_str(raw).map(Some).map_err(|e| {
        Error::internal_with_context(
            "annotation",
            format!("error parsing last successful spec: {e}"),
        )
    })
}

/// Whether the annotation already records `spec`
pub fn records_spec<S: Serialize>(
    annotations: Option<&BTreeMap<String, String>>,
    spec: &S,
) -> bool {
    let (Some(current), Ok(wanted)) = (
        annotations.and_then(|a| a.get(LAST_SUCCESSFUL_SPEC_ANNOTATION)),
        serde_json::to_value(spec),
    ) else {
        return false;
    };
    serde_json::from_str::<serde_json::Value>(current).is_ok_and(|v| v == wanted)
}
