//! JetJob admission rules
//!
//! Every function is pure. A running job's identity and artifact cannot be
//! swapped on the cluster, so the fields that carry them are frozen once the
//! job has converged.

use hz_common::annotations::last_successful_spec;
use hz_common::crd::{BucketConfiguration, Hazelcast, JetJob, JetJobSpec, JetJobState};
use hz_common::field::{FieldError, FieldPath};
use hz_common::{Error, Result};
use kube::ResourceExt;

const KIND: &str = "JetJob";
const CANNOT_BE_UPDATED: &str = "field cannot be updated";

fn spec_path() -> FieldPath {
    FieldPath::new("spec")
}

/// A job must be created in the `Running` state
pub fn validate_create(jj: &JetJob) -> Result<()> {
    if jj.spec.state == JetJobState::Running {
        return Ok(());
    }
    Err(Error::invalid_spec(
        KIND,
        jj.name_any(),
        vec![FieldError::invalid(
            spec_path().child("state"),
            jj.spec.state.to_string(),
            format!("should be set to {} on creation", JetJobState::Running),
        )],
    ))
}

/// No other live job may use the same job name on the same cluster.
///
/// `siblings` is every JetJob in the resource's namespace; the resource
/// itself, matched by namespace and name, is skipped.
pub fn validate_uniqueness(jj: &JetJob, siblings: &[JetJob]) -> Result<()> {
    let job_name = jj.job_name();
    let taken_by = siblings.iter().find(|other| {
        let same_object = other.namespace() == jj.namespace() && other.name_any() == jj.name_any();
        !same_object
            && other.metadata.deletion_timestamp.is_none()
            && other.job_name() == job_name
            && other.spec.hazelcast_resource_name == jj.spec.hazelcast_resource_name
    });
    match taken_by {
        Some(other) => Err(Error::conflict(
            KIND,
            jj.name_any(),
            format!(
                "spec.name: JetJob {} already uses the job name {job_name} on {}",
                other.name_any(),
                jj.spec.hazelcast_resource_name
            ),
        )),
        None => Ok(()),
    }
}

/// The target cluster must run the Jet engine with resource upload enabled
pub fn validate_precondition(hazelcast: &Hazelcast) -> Result<()> {
    let jet = &hazelcast.spec.jet;
    let path = spec_path().child("jet");
    let mut errors = Vec::new();
    if !jet.is_enabled() {
        errors.push(FieldError::invalid(
            path.child("enabled"),
            jet.enabled,
            "jet engine must be enabled",
        ));
    }
    if !jet.resource_upload_enabled {
        errors.push(FieldError::invalid(
            path.child("resourceUploadEnabled"),
            jet.resource_upload_enabled,
            "jet engine resource upload must be enabled",
        ));
    }
    if errors.is_empty() {
        return Ok(());
    }
    Err(Error::invalid_spec("Hazelcast", hazelcast.name_any(), errors))
}

/// Compare an update against the last successful spec.
///
/// Nothing is frozen before the first convergence. An annotation that does
/// not parse is reported as an internal field error.
pub fn validate_update(jj: &JetJob) -> Result<()> {
    let last = match last_successful_spec::<JetJobSpec>(jj.metadata.annotations.as_ref()) {
        Ok(Some(last)) => last,
        Ok(None) => return Ok(()),
        Err(e) => {
            return Err(Error::invalid_spec(
                KIND,
                jj.name_any(),
                vec![FieldError::internal(spec_path(), e.to_string())],
            ))
        }
    };
    let errors = validate_non_updatable_fields(&jj.spec, &last);
    if errors.is_empty() {
        return Ok(());
    }
    Err(Error::forbidden(KIND, jj.name_any(), errors))
}

/// Every frozen field that differs between `new` and `old`
pub fn validate_non_updatable_fields(new: &JetJobSpec, old: &JetJobSpec) -> Vec<FieldError> {
    let spec = spec_path();
    let mut errors = Vec::new();
    let mut frozen = |changed: bool, field: &str, detail: &str| {
        if changed {
            errors.push(FieldError::forbidden(spec.child(field), detail));
        }
    };

    frozen(new.name != old.name, "name", CANNOT_BE_UPDATED);
    frozen(
        new.hazelcast_resource_name != old.hazelcast_resource_name,
        "hazelcastResourceName",
        CANNOT_BE_UPDATED,
    );
    frozen(new.jar_name != old.jar_name, "jarName", CANNOT_BE_UPDATED);
    frozen(new.main_class != old.main_class, "mainClass", CANNOT_BE_UPDATED);
    frozen(
        new.is_bucket_enabled() != old.is_bucket_enabled(),
        "bucketConfiguration",
        "field cannot be added or removed",
    );
    frozen(
        new.is_remote_url_enabled() != old.is_remote_url_enabled(),
        "remoteURL",
        CANNOT_BE_UPDATED,
    );

    if let (Some(new_bucket), Some(old_bucket)) =
        (&new.bucket_configuration, &old.bucket_configuration)
    {
        errors.extend(validate_bucket_fields(new_bucket, old_bucket));
    }
    errors
}

/// Bucket URI and credential secret are frozen; other bucket options are not
pub fn validate_bucket_fields(
    new: &BucketConfiguration,
    old: &BucketConfiguration,
) -> Vec<FieldError> {
    let path = spec_path().child("bucketConfiguration");
    let mut errors = Vec::new();
    if new.bucket_uri != old.bucket_uri {
        errors.push(FieldError::forbidden(path.child("bucketURI"), CANNOT_BE_UPDATED));
    }
    if new.secret_name() != old.secret_name() {
        errors.push(FieldError::forbidden(path.child("secret"), CANNOT_BE_UPDATED));
    }
    errors
}
