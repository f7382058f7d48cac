//! CRD installation on startup
//!
//! Every CRD is installed with server-side apply, so restarts with a newer
//! operator version update the definitions in place.

use hz_common::crd::all_crds;
use hz_common::retry::{retry_with_backoff, RetryConfig};
use hz_common::FIELD_MANAGER;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;

/// Attempts per CRD before startup fails
const INSTALL_ATTEMPTS: u32 = 5;

/// `metadata.name` of a CRD, `<plural>.<group>`
fn crd_name(crd: &CustomResourceDefinition) -> String {
    format!("{}.{}", crd.spec.names.plural, crd.spec.group)
}

/// Install or update every CRD the operator serves
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let retry = RetryConfig::with_max_attempts(INSTALL_ATTEMPTS);

    for crd in all_crds() {
        let name = crd_name(&crd);
        let patch = Patch::Apply(&crd);
        tracing::info!(crd = %name, "Installing CRD");
        retry_with_backoff(&retry, "install_crd", || crds.patch(&name, &params, &patch))
        .await
        .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("All Hazelcast CRDs installed/updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_the_generated_metadata() {
        for crd in all_crds() {
            assert_eq!(Some(crd_name(&crd)), crd.metadata.name);
        }
        let names: Vec<String> = all_crds().iter().map(crd_name).collect();
        assert!(names.contains(&"jetjobs.hazelcast.com".to_string()));
        assert!(names.contains(&"replicatedmaps.hazelcast.com".to_string()));
    }
}
