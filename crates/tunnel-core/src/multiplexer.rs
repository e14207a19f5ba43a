//! The tunnel multiplexer: demultiplexes many UDP client flows onto one
//! reliable data channel and back.
//!
//! See the crate-level docs for the invariants this module maintains. In
//! short: every table mutation happens under a single lock so that an id
//! and its address never become visible to a reader out of step with each
//! other, and no teardown path panics — every I/O failure is logged and
//! localized to the one flow it touched.

use crate::error::{TunnelError, TunnelResult};
use crate::resolver::resolve_first;
use crate::sink::DataChannelSink;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tunnel_proto::Payload;

/// Room for the largest datagram the transport is expected to carry, with
/// headroom for tunnel framing (see spec's ~64 KiB MTU note).
const MAX_DATAGRAM: usize = 65536;

/// A locally-originated flow: the socket a datagram first arrived on, and
/// the source address responses must be delivered back to.
struct LocalClient {
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
}

/// All multiplexer state, guarded by one lock. Per the Design Notes, this
/// is deliberately a single mutex rather than five separately-locked maps:
/// the `(client_id, address)` pair must be published atomically or a reader
/// could observe an id with no matching `LocalClient` yet.
#[derive(Default)]
struct Tables {
    forwarders: HashMap<u16, CancellationToken>,
    remote_client_connections: HashMap<u32, Arc<UdpSocket>>,
    local_clients: HashMap<u32, LocalClient>,
    local_client_ids: HashMap<String, u32>,
    client_counter: u32,
}

/// Bridges UDP client flows to the other peer over one reliable, ordered
/// data channel.
///
/// Constructed once per [`crate::sink::DataChannelSink`] (i.e. once per
/// tunnel session). `forward_to_remote` may be called any number of times
/// with distinct ports; `on_message` is driven by the channel's inbound
/// callback; `stop` is driven by the channel's close callback.
pub struct Multiplexer {
    channel: Arc<dyn DataChannelSink>,
    tables: Arc<Mutex<Tables>>,
    shutdown: CancellationToken,
}

impl Multiplexer {
    /// Build a multiplexer that emits encoded tunnel packets on `channel`.
    pub fn new(channel: Arc<dyn DataChannelSink>) -> Self {
        Self {
            channel,
            tables: Arc::new(Mutex::new(Tables::default())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Install a forwarder rule: bind `0.0.0.0:local_port` and relay every
    /// datagram that arrives there to `remote_host:remote_port` on the
    /// other peer.
    ///
    /// Returns as soon as the bind succeeds (or fails); the read loop runs
    /// in the background. Calling this twice for the same port returns
    /// [`TunnelError::PortInUse`] without disturbing the existing rule.
    pub async fn forward_to_remote(
        &self,
        local_port: u16,
        remote_host: impl Into<String>,
        remote_port: u16,
    ) -> TunnelResult<()> {
        let remote_host = remote_host.into();

        {
            let tables = self.tables.lock().await;
            if tables.forwarders.contains_key(&local_port) {
                return Err(TunnelError::PortInUse(local_port));
            }
        }

        let socket = UdpSocket::bind(("0.0.0.0", local_port))
            .await
            .map_err(|source| TunnelError::Bind {
                port: local_port,
                source,
            })?;
        let socket = Arc::new(socket);

        let rule_token = self.shutdown.child_token();
        {
            let mut tables = self.tables.lock().await;
            tables.forwarders.insert(local_port, rule_token.clone());
        }

        info!(local_port, remote_host = %remote_host, remote_port, "forwarder rule installed");

        let tables = self.tables.clone();
        let channel = self.channel.clone();
        tokio::spawn(run_forwarder(
            socket,
            remote_host,
            remote_port,
            tables,
            channel,
            rule_token,
        ));

        Ok(())
    }

    /// Decode and dispatch one inbound data-channel message. Unknown
    /// variants and decode failures are logged and dropped — the session
    /// continues.
    pub async fn on_message(&self, bytes: &[u8]) {
        let packet = match tunnel_proto::decode(bytes).map_err(TunnelError::from) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(error = %err, "dropping undecodable tunnel packet");
                return;
            }
        };

        match packet.payload {
            Some(Payload::NewClient(nc)) => {
                self.handle_new_client(nc.client_id, nc.remote_addr, nc.remote_port as u16)
                    .await;
            }
            Some(Payload::Data(d)) => {
                self.deliver(d.client_id, d.is_response, d.data).await;
            }
            None => {
                warn!("dropping tunnel packet with no payload variant set");
            }
        }
    }

    /// Invoked when the data channel closes. Cancels every forwarder and
    /// remote-client reader; each observes the cancellation on its next
    /// loop iteration and exits without panicking.
    pub async fn stop(&self) {
        info!("stopping tunnel multiplexer");
        self.shutdown.cancel();
    }

    /// Receipt of `NewClient{id, host, port}` on the destination side:
    /// resolve, dial, remember, and start relaying responses back.
    async fn handle_new_client(&self, client_id: u32, host: String, port: u16) {
        let addr = match resolve_first(&host, port).await {
            Ok(addr) => addr,
            Err(err) => {
                warn!(
                    client_id, host = %host, port, error = %err,
                    "failed to resolve NewClient destination, dropping this flow"
                );
                return;
            }
        };

        let socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => socket,
            Err(err) => {
                warn!(client_id, error = %err, "failed to bind egress socket, dropping this flow");
                return;
            }
        };
        if let Err(source) = socket.connect(addr).await {
            let err = TunnelError::Dial { addr, source };
            warn!(client_id, error = %err, "dropping this flow");
            return;
        }
        let socket = Arc::new(socket);

        {
            let mut tables = self.tables.lock().await;
            tables
                .remote_client_connections
                .insert(client_id, socket.clone());
        }

        info!(client_id, %addr, "dialed new remote client");

        let token = self.shutdown.child_token();
        let channel = self.channel.clone();
        tokio::spawn(run_remote_reader(client_id, socket, channel, token));
    }

    /// Receipt of `Data{id, is_response, bytes}`: route to the egress
    /// socket (forward direction) or the original listener (response
    /// direction). Unknown ids are dropped with a diagnostic, never a panic.
    async fn deliver(&self, client_id: u32, is_response: bool, bytes: Vec<u8>) {
        if is_response {
            let target = {
                let tables = self.tables.lock().await;
                tables
                    .local_clients
                    .get(&client_id)
                    .map(|c| (c.socket.clone(), c.addr))
            };
            match target {
                Some((socket, addr)) => {
                    if let Err(err) = socket.send_to(&bytes, addr).await {
                        warn!(client_id, %addr, error = %err, "write error delivering response, mapping retained");
                    }
                }
                None => warn!(client_id, "dropping response for unknown client id"),
            }
        } else {
            let target = {
                let tables = self.tables.lock().await;
                tables.remote_client_connections.get(&client_id).cloned()
            };
            match target {
                Some(socket) => {
                    if let Err(err) = socket.send(&bytes).await {
                        warn!(client_id, error = %err, "write error delivering to remote client, mapping retained");
                    }
                }
                None => warn!(client_id, "dropping data for unknown client id"),
            }
        }
    }
}

/// Ingress loop on the originating side of one forwarder rule: read a
/// datagram, mint a client id on first sight of a new source address, emit
/// `NewClient` once per address followed by `Data{is_response=false}` for
/// every datagram.
async fn run_forwarder(
    socket: Arc<UdpSocket>,
    remote_host: String,
    remote_port: u16,
    tables: Arc<Mutex<Tables>>,
    channel: Arc<dyn DataChannelSink>,
    token: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = tokio::select! {
            _ = token.cancelled() => {
                debug!("forwarder read loop cancelled");
                return;
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok(v) => v,
                    Err(err) => {
                        warn!(error = %err, "forwarder read error, terminating this reader");
                        return;
                    }
                }
            }
        };

        let client_id = {
            let mut tables = tables.lock().await;
            let key = from.to_string();
            match tables.local_client_ids.get(&key).copied() {
                Some(id) => id,
                None => {
                    let id = tables.client_counter;
                    tables.client_counter += 1;
                    tables.local_client_ids.insert(key, id);
                    tables.local_clients.insert(
                        id,
                        LocalClient {
                            socket: socket.clone(),
                            addr: from,
                        },
                    );
                    drop(tables);

                    let announce = tunnel_proto::new_client(id, remote_host.clone(), remote_port);
                    if let Err(source) = channel.send(tunnel_proto::encode(&announce)).await {
                        let err = TunnelError::Send(source.to_string());
                        error!(client_id = id, error = %err, "failed to send NewClient on data channel");
                    }
                    id
                }
            }
        };

        let packet = tunnel_proto::data(client_id, false, buf[..len].to_vec());
        if let Err(source) = channel.send(tunnel_proto::encode(&packet)).await {
            let err = TunnelError::Send(source.to_string());
            error!(client_id, error = %err, "failed to send Data on data channel");
        }
    }
}

/// Egress reader on the destination side: relay everything the dialed
/// service sends back as `Data{is_response=true}`.
async fn run_remote_reader(
    client_id: u32,
    socket: Arc<UdpSocket>,
    channel: Arc<dyn DataChannelSink>,
    token: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let len = tokio::select! {
            _ = token.cancelled() => {
                debug!(client_id, "remote client reader cancelled");
                return;
            }
            result = socket.recv(&mut buf) => {
                match result {
                    Ok(len) => len,
                    Err(err) => {
                        warn!(client_id, error = %err, "remote client read error, terminating this reader");
                        return;
                    }
                }
            }
        };

        let packet = tunnel_proto::data(client_id, true, buf[..len].to_vec());
        if let Err(source) = channel.send(tunnel_proto::encode(&packet)).await {
            let err = TunnelError::Send(source.to_string());
            error!(client_id, error = %err, "failed to send response Data on data channel");
        }
    }
}
