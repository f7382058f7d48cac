//! Validating admission handlers
//!
//! Each handler decodes an AdmissionReview, runs the pure checks for the
//! kind and answers allowed or denied. Checks never write anything, so a
//! denied request leaves no trace.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use hz_common::crd::JetJob;
use hz_common::field::{FieldError, FieldPath};
use hz_common::Error;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info};

use crate::data_structure::{self, SpecRules};
use crate::{jet, WebhookState};

/// Validate a JetJob create or update
pub async fn validate_jet_job_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<JetJob>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<JetJob> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    let verdict = admit_jet_job(&state, &req).await;
    Json(respond(&req, verdict).into_review())
}

async fn admit_jet_job(state: &WebhookState, req: &AdmissionRequest<JetJob>) -> Result<(), Error> {
    let Some(object) = &req.object else {
        return Ok(());
    };
    let mut jj = object.clone();
    if jj.meta().namespace.is_none() {
        jj.meta_mut().namespace = req.namespace.clone();
    }
    let namespace = jj.namespace().unwrap_or_default();

    match req.operation {
        Operation::Create => {
            jet::validate_create(&jj)?;
            let name = &jj.spec.hazelcast_resource_name;
            match state.store.get_hazelcast(&namespace, name).await? {
                Some(hazelcast) => jet::validate_precondition(&hazelcast)?,
                None => {
                    return Err(Error::invalid_spec(
                        "JetJob",
                        jj.name_any(),
                        vec![FieldError::invalid(
                            FieldPath::new("spec").child("hazelcastResourceName"),
                            name,
                            "Hazelcast resource not found",
                        )],
                    ))
                }
            }
        }
        Operation::Update => jet::validate_update(&jj)?,
        _ => return Ok(()),
    }

    let siblings = state.store.list_jet_jobs(&namespace).await?;
    jet::validate_uniqueness(&jj, &siblings)
}

/// Validate a data-structure create or update
pub async fn validate_data_structure_handler<K: SpecRules>(
    Json(body): Json<AdmissionReview<K>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<K> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    let verdict = match (&req.operation, &req.object) {
        (Operation::Create, Some(obj)) => data_structure::validate_spec(obj),
        (Operation::Update, Some(obj)) => data_structure::validate_update(obj),
        _ => Ok(()),
    };
    Json(respond(&req, verdict).into_review())
}

fn respond<K: Resource>(req: &AdmissionRequest<K>, verdict: Result<(), Error>) -> AdmissionResponse {
    match verdict {
        Ok(()) => {
            debug!(uid = %req.uid, name = %req.name, "Admitted");
            AdmissionResponse::from(req)
        }
        Err(e) => {
            info!(uid = %req.uid, name = %req.name, operation = ?req.operation, error = %e, "Denied");
            AdmissionResponse::from(req).deny(e.to_string())
        }
    }
}
