//! Broadcast a request to every member of a cluster
//!
//! Dynamic config changes are only durable once every member has applied
//! them. [`broadcast`] fans the request out concurrently, bounds each call
//! with a deadline, and records what every member said. [`classify`] turns
//! that record into the overall verdict.

use std::time::Duration;

use futures::future::join_all;
use hz_protocol::response::decode_member_response;
use hz_protocol::{ClientMessage, MemberOutcome, PerMemberStatus};
use tracing::{debug, warn};

use crate::{ClusterClient, ClusterRef, TransportError};

/// Send `request` to every known member and collect each outcome.
///
/// Members without a live connection are recorded as unreachable. An empty
/// status means the client knows no member at all.
pub async fn broadcast(
    client: &dyn ClusterClient,
    request: &ClientMessage,
    response_type: i32,
    deadline: Duration,
) -> PerMemberStatus {
    let members = client.members();
    let calls = members.into_iter().map(|member| async move {
        let outcome = match tokio::time::timeout(
            deadline,
            client.invoke_on_member(&member, request.clone()),
        )
        .await
        {
            Ok(Ok(response)) => decode_member_response(&response, response_type),
            Ok(Err(e)) => MemberOutcome::Unreachable(e.to_string()),
            Err(_) => MemberOutcome::Unreachable(format!(
                "no response within {}s",
                deadline.as_secs_f64()
            )),
        };
        debug!(member = %member, outcome = %outcome, "Member answered");
        (member, outcome)
    });
    join_all(calls).await.into_iter().collect()
}

/// Overall verdict for a broadcast.
///
/// Success needs every member to have applied the request. A malformed
/// answer leaves the outcome unknown and is not retried. A structural
/// rejection from any member fails the whole request. Anything else is a
/// transport problem on the failing members.
pub fn classify(cluster: &ClusterRef, status: &PerMemberStatus) -> Result<(), hz_common::Error> {
    if status.is_empty() {
        return Err(hz_common::Error::not_ready(
            cluster.to_string(),
            "no member known",
        ));
    }
    if status.all_applied() {
        return Ok(());
    }
    if let Some((member, reason)) = status.malformed() {
        return Err(hz_common::Error::observation(format!(
            "member {member} sent an undecodable response: {reason}"
        )));
    }
    if let Some((member, holder)) = status.structural_rejection() {
        return Err(hz_common::Error::rejected(
            cluster.to_string(),
            format!("member {member} rejected the config: {}", holder.describe()),
        ));
    }

    let failing: Vec<String> = status.failing_members().into_iter().map(String::from).collect();
    warn!(cluster = %cluster, failing = ?failing, "Request not applied on every member");
    Err(hz_common::Error::transport_partial(
        cluster.to_string(),
        format!(
            "{} of {} members did not apply the request",
            failing.len(),
            status.len()
        ),
        failing,
    ))
}

/// Send `request` to any member, bounded by `deadline`
pub async fn invoke_with_deadline(
    client: &dyn ClusterClient,
    cluster: &ClusterRef,
    request: ClientMessage,
    deadline: Duration,
) -> Result<ClientMessage, hz_common::Error> {
    match tokio::time::timeout(deadline, client.invoke(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(TransportError::NoMembers(msg))) => {
            Err(hz_common::Error::not_ready(cluster.to_string(), msg))
        }
        Ok(Err(e)) => Err(hz_common::Error::transport(cluster.to_string(), e.to_string())),
        Err(_) => Err(hz_common::Error::transport(
            cluster.to_string(),
            format!("no response within {}s", deadline.as_secs_f64()),
        )),
    }
}

/// Verdict for a single-member request such as a job submission
pub fn expect_applied(
    cluster: &ClusterRef,
    response: &ClientMessage,
    response_type: i32,
) -> Result<(), hz_common::Error> {
    match decode_member_response(response, response_type) {
        MemberOutcome::Applied => Ok(()),
        MemberOutcome::Rejected(holder) if holder.is_structural_rejection() => Err(
            hz_common::Error::rejected(cluster.to_string(), holder.describe()),
        ),
        MemberOutcome::Rejected(holder) => Err(hz_common::Error::transport(
            cluster.to_string(),
            holder.describe(),
        )),
        MemberOutcome::Unreachable(reason) => {
            Err(hz_common::Error::transport(cluster.to_string(), reason))
        }
        MemberOutcome::Malformed(reason) => Err(hz_common::Error::observation(format!(
            "undecodable response from {cluster}: {reason}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockClusterClient;
    use hz_protocol::codec::error::{encode_error_response, ErrorHolder};
    use hz_protocol::codec::InitialFrameBuilder;
    use hz_protocol::config::ReplicatedMapConfig;
    use hz_protocol::{ConfigKind, WireConfig};

    const M1: &str = "10.0.0.1:5701";
    const M2: &str = "10.0.0.2:5701";
    const M3: &str = "10.0.0.3:5701";

    fn cluster() -> ClusterRef {
        ClusterRef::new("default", "hazelcast")
    }

    fn request() -> ClientMessage {
        WireConfig::ReplicatedMap(ReplicatedMapConfig {
            name: "orders".into(),
            ..Default::default()
        })
        .encode_request()
    }

    fn ok_response() -> ClientMessage {
        ClientMessage::from_frames(vec![InitialFrameBuilder::response(
            ConfigKind::ReplicatedMap.response_type(),
        )
        .build()])
    }

    fn rejection(class_name: &str) -> ClientMessage {
        encode_error_response(&[ErrorHolder::new(1, class_name, Some("nope"))])
    }

    fn client(answers: Vec<(&'static str, Result<ClientMessage, TransportError>)>) -> MockClusterClient {
        let members: Vec<String> = answers.iter().map(|(m, _)| m.to_string()).collect();
        let mut client = MockClusterClient::new();
        client.expect_members().returning(move || members.clone());
        let answers = std::sync::Mutex::new(answers.into_iter().collect::<std::collections::HashMap<_, _>>());
        client.expect_invoke_on_member().returning(move |member, _| {
            answers
                .lock()
                .unwrap()
                .remove(member)
                .unwrap_or_else(|| Err(TransportError::UnknownMember(member.to_string())))
        });
        client
    }

    async fn run(client: &MockClusterClient) -> (PerMemberStatus, Result<(), hz_common::Error>) {
        let status = broadcast(
            client,
            &request(),
            ConfigKind::ReplicatedMap.response_type(),
            Duration::from_secs(1),
        )
        .await;
        let verdict = classify(&cluster(), &status);
        (status, verdict)
    }

    // =========================================================================
    // Story: every member applies the config
    // =========================================================================

    #[tokio::test]
    async fn story_all_members_apply() {
        let client = client(vec![
            (M1, Ok(ok_response())),
            (M2, Ok(ok_response())),
            (M3, Ok(ok_response())),
        ]);
        let (status, verdict) = run(&client).await;

        assert_eq!(status.len(), 3);
        assert!(verdict.is_ok());
        assert_eq!(status.to_status_map().get(M2).map(String::as_str), Some("ok"));
    }

    // =========================================================================
    // Story: one member is unreachable
    // =========================================================================
    //
    // Two members applied, the third never answered. The request is
    // idempotent, so the verdict is a retryable transport error naming the
    // member that failed.

    #[tokio::test]
    async fn story_partial_failure_is_retryable_and_names_the_member() {
        let client = client(vec![
            (M1, Ok(ok_response())),
            (M2, Err(TransportError::Closed(M2.into()))),
            (M3, Ok(ok_response())),
        ]);
        let (status, verdict) = run(&client).await;

        let err = verdict.unwrap_err();
        assert!(err.is_retryable());
        match err {
            hz_common::Error::Transport { failing_members, .. } => {
                assert_eq!(failing_members, vec![M2.to_string()]);
            }
            other => panic!("expected transport error, got {other:?}"),
        }
        assert!(status.to_status_map()[M2].contains("closed"));
    }

    // =========================================================================
    // Story: a member rejects the config
    // =========================================================================

    #[tokio::test]
    async fn story_structural_rejection_fails_the_request() {
        let client = client(vec![
            (M1, Ok(ok_response())),
            (
                M2,
                Ok(rejection("com.hazelcast.config.InvalidConfigurationException")),
            ),
        ]);
        let (_, verdict) = run(&client).await;

        let err = verdict.unwrap_err();
        assert!(matches!(err, hz_common::Error::RejectedByCluster { .. }));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains(M2));
    }

    #[tokio::test]
    async fn non_structural_error_response_is_a_transport_failure() {
        let client = client(vec![(
            M1,
            Ok(rejection("com.hazelcast.core.HazelcastInstanceNotActiveException")),
        )]);
        let (_, verdict) = run(&client).await;
        assert!(matches!(verdict, Err(hz_common::Error::Transport { .. })));
    }

    #[tokio::test]
    async fn wrong_response_type_is_an_observation_failure() {
        let wrong = ClientMessage::from_frames(vec![InitialFrameBuilder::response(
            ConfigKind::Map.response_type(),
        )
        .build()]);
        let client = client(vec![(M1, Ok(ok_response())), (M2, Ok(wrong))]);
        let (_, verdict) = run(&client).await;

        let err = verdict.unwrap_err();
        assert!(matches!(err, hz_common::Error::Observation { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn no_members_is_not_ready() {
        let client = client(Vec::new());
        let (status, verdict) = run(&client).await;
        assert!(status.is_empty());
        assert!(matches!(verdict, Err(hz_common::Error::NotReady { .. })));
    }

    #[tokio::test]
    async fn invoke_maps_missing_members_to_not_ready() {
        let mut client = MockClusterClient::new();
        client
            .expect_invoke()
            .returning(|_| Err(TransportError::NoMembers("all connections closed".into())));
        let err = invoke_with_deadline(&client, &cluster(), request(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, hz_common::Error::NotReady { .. }));
    }

    #[test]
    fn single_response_verdicts() {
        let response_type = ConfigKind::ReplicatedMap.response_type();
        assert!(expect_applied(&cluster(), &ok_response(), response_type).is_ok());

        let rejected = expect_applied(
            &cluster(),
            &rejection("java.lang.IllegalArgumentException"),
            response_type,
        )
        .unwrap_err();
        assert!(matches!(rejected, hz_common::Error::RejectedByCluster { .. }));

        let busy = expect_applied(
            &cluster(),
            &rejection("com.hazelcast.spi.exception.RetryableHazelcastException"),
            response_type,
        )
        .unwrap_err();
        assert!(busy.is_retryable());
    }
}
