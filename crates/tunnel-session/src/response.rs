//! The Responder role: the side that receives an invitation token and
//! answers it.

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

/// A bring-up in progress, responder side. Call [`Response::new`] with the
/// peer's invitation token to obtain a `response_token()` to hand back, then
/// [`Response::connect`] to finish.
pub struct Response {
    peer_connection: Arc<RTCPeerConnection>,
    config: SessionConfig,
    token: String,
    connected_rx: oneshot::Receiver<()>,
    udp_channel_rx: oneshot::Receiver<Arc<RTCDataChannel>>,
}

impl Response {
    pub async fn new(invitation_token: &str, config: SessionConfig) -> SessionResult<Self> {
        let peer_connection = new_peer_connection(&config).await?;

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

        let (udp_tx, udp_channel_rx) = oneshot::channel();
        let udp_tx = Mutex::new(Some(udp_tx));
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            if dc.label() == "UDP" {
                if let Some(tx) = udp_tx.lock().unwrap().take() {
                    let _ = tx.send(dc);
                }
            } else {
                tracing::debug!(label = %dc.label(), "ignoring data channel with unexpected label");
            }
            Box::pin(async {})
        }));

        let offer: RTCSessionDescription = serde_json::from_str(invitation_token)?;
        peer_connection
            .set_remote_description(offer)
            .await
            .map_err(SessionError::SetRemoteDescription)?;

        let answer = peer_connection
            .create_answer(None)
            .await
            .map_err(SessionError::CreateDescription)?;
        peer_connection
            .set_local_description(answer)
            .await
            .map_err(SessionError::SetLocalDescription)?;

        let token =
            finalized_local_description_token(&peer_connection, config.gather_timeout).await?;

        Ok(Self {
            peer_connection,
            config,
            token,
            connected_rx,
            udp_channel_rx,
        })
    }

    /// The token to hand back to the offerer out of band.
    pub fn response_token(&self) -> &str {
        &self.token
    }

    /// Complete bring-up: wait for the connection to reach `Connected`, then
    /// for the peer to open the `"UDP"` tunnel data channel.
    pub async fn connect(self) -> SessionResult<Session> {
        tokio::time::timeout(self.config.connect_timeout, self.connected_rx)
            .await
            .map_err(|_| SessionError::Timeout("peer connection to reach Connected"))?
            .map_err(|_| SessionError::ConnectionFailed)?;

        let udp_channel = tokio::time::timeout(self.config.connect_timeout, self.udp_channel_rx)
            .await
            .map_err(|_| SessionError::Timeout("peer to open the UDP data channel"))?
            .map_err(|_| SessionError::RendezvousFailed)?;

        wait_for_open(&udp_channel, self.config.connect_timeout).await?;

        Ok(Session::new(self.peer_connection, udp_channel))
    }
}
