//! Per-member outcomes of a broadcast request
//!
//! Dynamic config requests are sent to every member. Each member's answer is
//! decoded into a [`MemberOutcome`] and collected into a [`PerMemberStatus`]
//! keyed by member address. The overall verdict is only a success if every
//! member applied the config.

use std::collections::BTreeMap;
use std::fmt;

use crate::codec::error::{decode_error_response, is_error_response, ErrorHolder};
use crate::codec::expect_message_type;
use crate::frame::ClientMessage;

/// Outcome of a request on one member
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberOutcome {
    /// Member answered with the expected response type
    Applied,
    /// Member answered with an error response
    Rejected(ErrorHolder),
    /// No answer (connection failure, timeout)
    Unreachable(String),
    /// Answer could not be decoded
    Malformed(String),
}

impl MemberOutcome {
    /// Whether the member applied the request
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

impl fmt::Display for MemberOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "ok"),
            Self::Rejected(holder) => write!(f, "{}", holder.describe()),
            Self::Unreachable(reason) => write!(f, "unreachable: {reason}"),
            Self::Malformed(reason) => write!(f, "malformed response: {reason}"),
        }
    }
}

/// Decode one member's answer to a request whose response type is
/// `expected_type`. Never fails: undecodable input becomes
/// [`MemberOutcome::Malformed`].
pub fn decode_member_response(message: &ClientMessage, expected_type: i32) -> MemberOutcome {
    if is_error_response(message) {
        return match decode_error_response(message) {
            Ok(holders) => match holders.into_iter().next() {
                Some(holder) => MemberOutcome::Rejected(holder),
                None => MemberOutcome::Malformed("error response without error holders".into()),
            },
            Err(e) => MemberOutcome::Malformed(e.to_string()),
        };
    }
    match expect_message_type(message, expected_type) {
        Ok(()) => MemberOutcome::Applied,
        Err(e) => MemberOutcome::Malformed(e.to_string()),
    }
}

/// Outcome per member address
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerMemberStatus(BTreeMap<String, MemberOutcome>);

impl PerMemberStatus {
    /// Empty status
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a member's outcome
    pub fn insert(&mut self, member: impl Into<String>, outcome: MemberOutcome) {
        self.0.insert(member.into(), outcome);
    }

    /// Whether at least one member answered and all of them applied
    pub fn all_applied(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(MemberOutcome::is_ok)
    }

    /// Members that did not apply the request, in address order
    pub fn failing_members(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, outcome)| !outcome.is_ok())
            .map(|(member, _)| member.as_str())
            .collect()
    }

    /// First structural rejection reported by any member
    pub fn structural_rejection(&self) -> Option<(&str, &ErrorHolder)> {
        self.0.iter().find_map(|(member, outcome)| match outcome {
            MemberOutcome::Rejected(holder) if holder.is_structural_rejection() => {
                Some((member.as_str(), holder))
            }
            _ => None,
        })
    }

    /// First malformed answer reported by any member
    pub fn malformed(&self) -> Option<(&str, &str)> {
        self.0.iter().find_map(|(member, outcome)| match outcome {
            MemberOutcome::Malformed(reason) => Some((member.as_str(), reason.as_str())),
            _ => None,
        })
    }

    /// Iterate over `(member, outcome)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MemberOutcome)> {
        self.0.iter().map(|(m, o)| (m.as_str(), o))
    }

    /// Member address to human-readable outcome, as written to status
    pub fn to_status_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(member, outcome)| (member.clone(), outcome.to_string()))
            .collect()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no member was recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, MemberOutcome)> for PerMemberStatus {
    fn from_iter<I: IntoIterator<Item = (String, MemberOutcome)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::dynamic_config::ADD_REPLICATED_MAP_CONFIG_REQUEST;
    use crate::codec::error::encode_error_response;
    use crate::codec::{InitialFrameBuilder, MessageBuilder};

    fn ok_response() -> ClientMessage {
        MessageBuilder::new(
            InitialFrameBuilder::response(ADD_REPLICATED_MAP_CONFIG_REQUEST + 1).build(),
        )
        .build()
    }

    #[test]
    fn expected_response_type_is_applied() {
        let outcome = decode_member_response(&ok_response(), ADD_REPLICATED_MAP_CONFIG_REQUEST + 1);
        assert_eq!(outcome, MemberOutcome::Applied);
    }

    #[test]
    fn error_response_is_a_rejection() {
        let holder = ErrorHolder::new(
            83,
            "com.hazelcast.config.InvalidConfigurationException",
            Some("conflicting config"),
        );
        let message = encode_error_response(&[holder.clone()]);
        let outcome = decode_member_response(&message, ADD_REPLICATED_MAP_CONFIG_REQUEST + 1);
        assert_eq!(outcome, MemberOutcome::Rejected(holder));
    }

    #[test]
    fn wrong_response_type_is_malformed_not_a_panic() {
        let outcome = decode_member_response(&ok_response(), 0x1B0C01);
        assert!(matches!(outcome, MemberOutcome::Malformed(_)));
        let empty = ClientMessage::default();
        assert!(matches!(
            decode_member_response(&empty, 0x1B0C01),
            MemberOutcome::Malformed(_)
        ));
    }

    #[test]
    fn partial_success_names_failing_members() {
        let status: PerMemberStatus = [
            ("10.0.0.1:5701".to_string(), MemberOutcome::Applied),
            (
                "10.0.0.2:5701".to_string(),
                MemberOutcome::Unreachable("connection reset".to_string()),
            ),
            ("10.0.0.3:5701".to_string(), MemberOutcome::Applied),
        ]
        .into_iter()
        .collect();

        assert!(!status.all_applied());
        assert_eq!(status.failing_members(), vec!["10.0.0.2:5701"]);
        assert!(status.structural_rejection().is_none());
        assert_eq!(
            status.to_status_map()["10.0.0.2:5701"],
            "unreachable: connection reset"
        );
    }

    #[test]
    fn empty_status_is_not_success() {
        assert!(!PerMemberStatus::new().all_applied());
    }
}
