//! Client service: authentication and membership

use uuid::Uuid;

use crate::codec::{
    expect_begin, expect_message_type, read_nullable_string, read_string, FixedReader,
    InitialFrameBuilder, MessageBuilder,
};
use crate::error::ProtocolError;
use crate::frame::{ClientMessage, RESPONSE_HEADER_SIZE};
use crate::Result;

/// Client.Authentication
pub const AUTHENTICATION_REQUEST: i32 = 0x000100;

/// Client type reported to members
pub const CLIENT_TYPE: &str = "RST";
/// Serialization version spoken by this client
pub const SERIALIZATION_VERSION: u8 = 1;
/// Client version reported to members
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol bytes sent once when a connection opens
pub const CONNECTION_PREAMBLE: &[u8; 3] = b"CP2";

/// Authentication outcome codes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    /// Connection accepted
    Authenticated,
    /// Credentials rejected
    CredentialsFailed,
    /// Serialization version not supported by the member
    SerializationVersionMismatch,
    /// Cluster refused this client
    NotAllowedInCluster,
}

impl AuthStatus {
    fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Self::Authenticated,
            1 => Self::CredentialsFailed,
            2 => Self::SerializationVersionMismatch,
            3 => Self::NotAllowedInCluster,
            other => {
                return Err(ProtocolError::malformed(format!(
                    "unknown authentication status {other}"
                )))
            }
        })
    }
}

/// Decoded authentication response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthResponse {
    /// Outcome
    pub status: AuthStatus,
    /// Member the connection is attached to
    pub member_uuid: Option<Uuid>,
    /// Cluster id
    pub cluster_id: Option<Uuid>,
    /// Address of the member, `host:port`
    pub address: Option<String>,
    /// Member version
    pub server_version: String,
}

/// Encode an authentication request without credentials
pub fn encode_authentication(cluster_name: &str, client_uuid: Uuid) -> ClientMessage {
    let initial = InitialFrameBuilder::request(AUTHENTICATION_REQUEST)
        .uuid(Some(client_uuid))
        .byte(SERIALIZATION_VERSION)
        .build();
    MessageBuilder::new(initial)
        .string(cluster_name)
        .null() // username
        .null() // password
        .string(CLIENT_TYPE)
        .string(CLIENT_VERSION)
        .string("hazelcast-operator")
        .string_list(&[])
        .build()
}

/// Decode an authentication response.
///
/// Fixed part: status byte, member uuid, serialization version, partition
/// count, cluster id, failover flag. Variable part: member address (nullable
/// struct, read as its host string), server version, then optional fields
/// this client ignores.
pub fn decode_authentication(message: &ClientMessage) -> Result<AuthResponse> {
    expect_message_type(message, AUTHENTICATION_REQUEST + 1)?;
    let initial = message.initial_frame()?;
    let mut fixed = FixedReader::at(&initial.content, RESPONSE_HEADER_SIZE);
    let status = AuthStatus::from_code(fixed.read_byte()?)?;
    let member_uuid = fixed.read_uuid()?;
    let _serialization_version = fixed.read_byte()?;
    let _partition_count = fixed.read_int()?;
    let cluster_id = fixed.read_uuid()?;

    let mut body = message.body();
    let address = if body.next_is_null() {
        None
    } else {
        // Address struct: begin, fixed port frame, host, end
        expect_begin(&mut body, "address")?;
        let port_frame = body.next_frame("address port")?;
        let port = FixedReader::at(&port_frame.content, 0).read_int()?;
        let host = read_string(&mut body, "address host")?;
        body.skip_to_struct_end()?;
        Some(format!("{host}:{port}"))
    };
    let server_version = read_nullable_string(&mut body, "server version")?.unwrap_or_default();
    Ok(AuthResponse {
        status,
        member_uuid,
        cluster_id,
        address,
        server_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_string_list;
    use crate::frame::Frame;

    fn auth_response(status: u8) -> ClientMessage {
        let member = Uuid::from_u128(7);
        let initial = InitialFrameBuilder::response(AUTHENTICATION_REQUEST + 1)
            .byte(status)
            .uuid(Some(member))
            .byte(1)
            .int(271)
            .uuid(Some(Uuid::from_u128(9)))
            .bool(false)
            .build();
        MessageBuilder::new(initial)
            .frame(Frame::begin())
            .frame(Frame::new(5701i32.to_le_bytes().to_vec()))
            .string("10.0.0.4")
            .frame(Frame::end())
            .string("5.4.0")
            .build()
    }

    #[test]
    fn authenticated_response_decodes_member() {
        let response = decode_authentication(&auth_response(0)).unwrap();
        assert_eq!(response.status, AuthStatus::Authenticated);
        assert_eq!(response.member_uuid, Some(Uuid::from_u128(7)));
        assert_eq!(response.address.as_deref(), Some("10.0.0.4:5701"));
        assert_eq!(response.server_version, "5.4.0");
    }

    #[test]
    fn rejected_credentials_are_reported() {
        let response = decode_authentication(&auth_response(1)).unwrap();
        assert_eq!(response.status, AuthStatus::CredentialsFailed);
    }

    #[test]
    fn request_names_the_cluster() {
        let request = encode_authentication("dev", Uuid::nil());
        let mut body = request.body();
        assert_eq!(read_string(&mut body, "cluster").unwrap(), "dev");
        assert!(body.next_is_null());
        assert!(body.next_is_null());
        assert_eq!(read_string(&mut body, "type").unwrap(), CLIENT_TYPE);
        read_string(&mut body, "version").unwrap();
        read_string(&mut body, "name").unwrap();
        assert!(read_string_list(&mut body, "labels").unwrap().is_empty());
    }
}
