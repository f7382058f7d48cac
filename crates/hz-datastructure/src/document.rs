//! Persisted configuration document
//!
//! The document is the YAML form of a cluster's persisted configuration:
//!
//! ```yaml
//! hazelcast:
//!   replicatedmap:
//!     sessions:
//!       in-memory-format: OBJECT
//!       async-fillup: true
//! ```
//!
//! Bodies are rendered from normalized wire configs and decoded back into
//! them, so a document rendered from a config always reads back equal to it.

use std::collections::BTreeMap;

use hz_common::{Error, Result};
use hz_protocol::{ConfigKind, WireConfig};

const ROOT: &str = "hazelcast";

/// Render a persisted configuration document holding `configs`
pub fn render<'a>(configs: impl IntoIterator<Item = &'a WireConfig>) -> Result<String> {
    let mut sections: BTreeMap<&'static str, BTreeMap<String, serde_json::Value>> =
        BTreeMap::new();
    for config in configs {
        sections
            .entry(config.kind().section())
            .or_default()
            .insert(config.name().to_string(), config.to_document()?);
    }
    let document = BTreeMap::from([(ROOT, sections)]);
    serde_yaml::to_string(&document).map_err(|e| Error::serialization(e.to_string()))
}

/// Extract the config for `kind`/`name` from a persisted document.
///
/// Returns `Ok(None)` when the document does not mention the object. A
/// document or body that does not decode is an observation failure.
pub fn extract(document: &str, kind: ConfigKind, name: &str) -> Result<Option<WireConfig>> {
    let parsed: serde_json::Value = serde_yaml::from_str(document)
        .map_err(|e| Error::observation(format!("persisted config is not valid YAML: {e}")))?;
    let Some(body) = parsed
        .get(ROOT)
        .and_then(|root| root.get(kind.section()))
        .and_then(|section| section.get(name))
    else {
        return Ok(None);
    };
    Ok(Some(WireConfig::from_snapshot(kind, name, body)?))
}
