use std::sync::Arc;
use tokio::sync::watch;
use tunnel_core::{Multiplexer, TunnelResult};
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

use crate::channel::attach_multiplexer;

/// A bootstrapped tunnel: the negotiated peer connection plus the
/// multiplexer riding its `"UDP"` data channel.
///
/// Returned by [`crate::Invitation::connect`] (initiator role) or
/// [`crate::Response::connect`] (acceptor role) once rendezvous succeeds.
pub struct Session {
    _peer_connection: Arc<RTCPeerConnection>,
    multiplexer: Arc<Multiplexer>,
    closed: watch::Receiver<bool>,
}

impl Session {
    pub(crate) fn new(peer_connection: Arc<RTCPeerConnection>, udp_channel: Arc<RTCDataChannel>) -> Self {
        let multiplexer = attach_multiplexer(udp_channel);
        // `watch` stores the last value sent, so a state change that lands
        // before `run_until_closed` starts awaiting isn't lost the way a
        // `Notify::notify_waiters` call with no waiter yet would be.
        let (closed_tx, closed_rx) = watch::channel(false);

        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                if matches!(
                    state,
                    RTCPeerConnectionState::Closed
                        | RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                ) {
                    let _ = closed_tx.send(true);
                }
                Box::pin(async {})
            },
        ));

        Self {
            _peer_connection: peer_connection,
            multiplexer,
            closed: closed_rx,
        }
    }

    /// The underlying multiplexer, for installing forwarder rules or
    /// inspecting state directly.
    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.multiplexer
    }

    /// Install a forwarder rule on this session's multiplexer. See
    /// [`Multiplexer::forward_to_remote`] — exposed symmetrically on both
    /// roles, regardless of which side dialed the other.
    pub async fn forward_to_remote(
        &self,
        local_port: u16,
        remote_host: impl Into<String>,
        remote_port: u16,
    ) -> TunnelResult<()> {
        self.multiplexer
            .forward_to_remote(local_port, remote_host, remote_port)
            .await
    }

    /// Block until the peer connection closes, fails, or disconnects.
    ///
    /// Returns immediately if that has already happened by the time this is
    /// called.
    pub async fn run_until_closed(&mut self) {
        while !*self.closed.borrow() {
            if self.closed.changed().await.is_err() {
                // Sender dropped without ever flipping to true; the peer
                // connection (and its callback) outlives the session, so
                // this only happens if the session itself is being torn
                // down concurrently.
                return;
            }
        }
    }
}
