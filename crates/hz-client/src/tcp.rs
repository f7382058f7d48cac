//! TCP transport: one authenticated connection per member
//!
//! Each [`MemberConnection`] owns a background reader task that reassembles
//! frames into messages and hands responses to the caller waiting on the
//! matching correlation id. Writers are serialized behind a mutex; a message
//! is always written in one piece.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use dashmap::DashMap;
use futures::future::join_all;
use hz_common::retry::{retry_while, RetryConfig};
use hz_protocol::codec::client::{
    decode_authentication, encode_authentication, AuthStatus, CONNECTION_PREAMBLE,
};
use hz_protocol::frame::MessageAssembler;
use hz_protocol::{ClientMessage, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{ClusterClient, TransportError};

type Pending = DashMap<i64, oneshot::Sender<ClientMessage>>;

/// How to reach a cluster
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// Cluster name members authenticate against
    pub cluster_name: String,
    /// Member addresses, `host:port`
    pub addresses: Vec<String>,
    /// Bound on TCP connect plus authentication per attempt
    pub connect_timeout: Duration,
    /// Backoff between connection attempts
    pub retry: RetryConfig,
}

/// Authenticated connection to one member
pub struct MemberConnection {
    address: String,
    writer: Mutex<OwnedWriteHalf>,
    pending: Arc<Pending>,
    next_correlation_id: AtomicI64,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl MemberConnection {
    /// Connect to `address` and authenticate against `cluster_name`
    pub async fn open(
        address: &str,
        cluster_name: &str,
        client_uuid: Uuid,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let io_err = |source| TransportError::Io {
            member: address.to_string(),
            source,
        };
        let timed_out = || TransportError::Io {
            member: address.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
        };

        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| timed_out())?
            .map_err(io_err)?;
        stream.set_nodelay(true).map_err(io_err)?;
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(CONNECTION_PREAMBLE)
            .await
            .map_err(io_err)?;

        let pending = Arc::new(Pending::new());
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(
            address.to_string(),
            read_half,
            Arc::clone(&pending),
            Arc::clone(&alive),
        ));
        let connection = Self {
            address: address.to_string(),
            writer: Mutex::new(write_half),
            pending,
            next_correlation_id: AtomicI64::new(1),
            alive,
            reader,
        };

        let response = tokio::time::timeout(
            timeout,
            connection.invoke(encode_authentication(cluster_name, client_uuid)),
        )
        .await
        .map_err(|_| timed_out())??;
        let auth = decode_authentication(&response)?;
        if auth.status != AuthStatus::Authenticated {
            return Err(TransportError::Authentication {
                member: address.to_string(),
                reason: format!("{:?}", auth.status),
            });
        }
        debug!(
            member = %address,
            server_version = %auth.server_version,
            "Authenticated with member"
        );
        Ok(connection)
    }

    /// Address this connection was opened to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the reader is still running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Send `request` and wait for the response with the same correlation id
    pub async fn invoke(&self, mut request: ClientMessage) -> Result<ClientMessage, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed(self.address.clone()));
        }
        let id = self.next_correlation_id.fetch_add(1, Ordering::Relaxed);
        request.set_correlation_id(id)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        {
            let mut writer = self.writer.lock().await;
            if let Err(source) = writer.write_all(&request.to_bytes()).await {
                self.alive.store(false, Ordering::Release);
                return Err(TransportError::Io {
                    member: self.address.clone(),
                    source,
                });
            }
        }

        rx.await
            .map_err(|_| TransportError::Closed(self.address.clone()))
    }
}

impl Drop for MemberConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a pending entry when the waiting caller goes away
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: i64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

async fn read_loop(
    address: String,
    mut reader: OwnedReadHalf,
    pending: Arc<Pending>,
    alive: Arc<AtomicBool>,
) {
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut assembler = MessageAssembler::default();

    'read: loop {
        loop {
            match Frame::decode(&mut buf) {
                Ok(Some(frame)) => match assembler.push(frame) {
                    Ok(Some(message)) => dispatch(&address, &pending, message),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(member = %address, error = %e, "Oversized message, closing connection");
                        break 'read;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(member = %address, error = %e, "Corrupt frame, closing connection");
                    break 'read;
                }
            }
        }
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!(member = %address, "Member closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(member = %address, error = %e, "Read failed, closing connection");
                break;
            }
        }
    }

    alive.store(false, Ordering::Release);
    // Dropping the senders wakes every waiter with a closed error
    pending.clear();
}

fn dispatch(address: &str, pending: &Pending, message: ClientMessage) {
    if message.is_event() {
        return;
    }
    match message.correlation_id() {
        Ok(id) => match pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(message);
            }
            None => debug!(member = %address, correlation_id = id, "Dropping unsolicited response"),
        },
        Err(e) => warn!(member = %address, error = %e, "Response without correlation id"),
    }
}

/// [`ClusterClient`] over one TCP connection per configured member
pub struct TcpClusterClient {
    cluster_name: String,
    members: Vec<String>,
    connections: DashMap<String, Arc<MemberConnection>>,
    next: AtomicUsize,
}

impl TcpClusterClient {
    /// Connect to every configured member.
    ///
    /// Succeeds once at least one member is connected. Members that stay
    /// unreachable after the retry budget have no connection but are still
    /// listed by [`ClusterClient::members`], so broadcasts report them.
    pub async fn connect(options: ConnectOptions) -> Result<Self, TransportError> {
        let client_uuid = Uuid::new_v4();
        let attempts = options.addresses.iter().map(|address| {
            let options = &options;
            async move {
                let result = retry_while(
                    &options.retry,
                    "connect_member",
                    || {
                        MemberConnection::open(
                            address,
                            &options.cluster_name,
                            client_uuid,
                            options.connect_timeout,
                        )
                    },
                    TransportError::is_retryable,
                )
                .await;
                (address.clone(), result)
            }
        });

        let connections = DashMap::new();
        let mut failures = Vec::new();
        for (address, result) in join_all(attempts).await {
            match result {
                Ok(connection) => {
                    connections.insert(address, Arc::new(connection));
                }
                Err(e) => failures.push(format!("{address}: {e}")),
            }
        }
        if connections.is_empty() {
            return Err(TransportError::NoMembers(failures.join("; ")));
        }
        info!(
            cluster_name = %options.cluster_name,
            connected = connections.len(),
            configured = options.addresses.len(),
            "Connected to cluster"
        );
        let mut members = options.addresses;
        members.sort();
        members.dedup();
        Ok(Self {
            cluster_name: options.cluster_name,
            members,
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Cluster name this client authenticated against
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn live_connection(&self, member: &str) -> Result<Arc<MemberConnection>, TransportError> {
        let connection = self
            .connections
            .get(member)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TransportError::UnknownMember(member.to_string()))?;
        if !connection.is_alive() {
            return Err(TransportError::Closed(member.to_string()));
        }
        Ok(connection)
    }
}

#[async_trait]
impl ClusterClient for TcpClusterClient {
    fn members(&self) -> Vec<String> {
        self.members.clone()
    }

    fn connected_members(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|member| {
                self.connections
                    .get(member.as_str())
                    .is_some_and(|entry| entry.value().is_alive())
            })
            .cloned()
            .collect()
    }

    async fn invoke_on_member(
        &self,
        member: &str,
        request: ClientMessage,
    ) -> Result<ClientMessage, TransportError> {
        self.live_connection(member)?.invoke(request).await
    }

    async fn invoke(&self, request: ClientMessage) -> Result<ClientMessage, TransportError> {
        let members = self.connected_members();
        if members.is_empty() {
            return Err(TransportError::NoMembers(format!(
                "all connections to cluster {} are closed",
                self.cluster_name
            )));
        }
        let member = &members[self.next.fetch_add(1, Ordering::Relaxed) % members.len()];
        self.invoke_on_member(member, request).await
    }
}
