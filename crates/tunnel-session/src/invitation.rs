//! The Offerer role: the side that starts bring-up by minting the first
//! token and hands the result to a peer out of band.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::channel::wait_for_open;
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::peer::{finalized_local_description_token, new_peer_connection};
use crate::session::Session;

/// A bring-up in progress, offerer side. Call [`Invitation::new`] to obtain
/// an `invitation_token()` to hand to the peer, then [`Invitation::connect`]
/// once the peer's response token comes back.
pub struct Invitation {
    peer_connection: Arc<RTCPeerConnection>,
    config: SessionConfig,
    token: String,
    connected_rx: oneshot::Receiver<()>,
    // Kept alive only so the pre-negotiation data channel isn't dropped
    // before the offer is sent; webrtc-rs needs at least one channel or
    // track present to produce a non-empty SDP offer.
    _stub_channel: Arc<RTCDataChannel>,
}

impl Invitation {
    pub async fn new(config: SessionConfig) -> SessionResult<Self> {
        let peer_connection = new_peer_connection(&config).await?;

        let stub_channel = peer_connection
            .create_data_channel("data", None)
            .await
            .map_err(SessionError::PeerConnection)?;

        let (connected_tx, connected_rx) = oneshot::channel();
        let connected_tx = Mutex::new(Some(connected_tx));
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                if state == RTCPeerConnectionState::Connected {
                    if let Some(tx) = connected_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                }
                Box::pin(async {})
            },
        ));

        let offer = peer_connection
            .create_offer(None)
            .await
            .map_err(SessionError::CreateDescription)?;
        peer_connection
            .set_local_description(offer)
            .await
            .map_err(SessionError::SetLocalDescription)?;

        let token =
            finalized_local_description_token(&peer_connection, config.gather_timeout).await?;

        Ok(Self {
            peer_connection,
            config,
            token,
            connected_rx,
            _stub_channel: stub_channel,
        })
    }

    /// The token to hand to the peer out of band (email, chat, QR code —
    /// whatever the caller's transport is).
    pub fn invitation_token(&self) -> &str {
        &self.token
    }

    /// Complete bring-up once the peer's response token is in hand. Opens
    /// the `"UDP"` tunnel data channel as initiator.
    pub async fn connect(self, response_token: &str) -> SessionResult<Session> {
        let answer: RTCSessionDescription = serde_json::from_str(response_token)?;
        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(SessionError::SetRemoteDescription)?;

        tokio::time::timeout(self.config.connect_timeout, self.connected_rx)
            .await
            .map_err(|_| SessionError::Timeout("peer connection to reach Connected"))?
            .map_err(|_| SessionError::ConnectionFailed)?;

        let udp_channel = self
            .peer_connection
            .create_data_channel("UDP", None)
            .await
            .map_err(SessionError::OpenDataChannel)?;
        wait_for_open(&udp_channel, self.config.connect_timeout).await?;

        Ok(Session::new(self.peer_connection, udp_channel))
    }
}
