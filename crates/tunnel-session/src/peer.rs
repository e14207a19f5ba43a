//! Shared peer-connection construction for both the Offerer and Responder
//! roles.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

/// Build a fresh peer-connection configured with the session's ICE servers.
pub(crate) async fn new_peer_connection(
    config: &SessionConfig,
) -> SessionResult<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(SessionError::PeerConnection)?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .map_err(SessionError::PeerConnection)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: config.ice_servers.clone(),
            ..Default::default()
        }],
        ..Default::default()
    };

    let peer_connection = api
        .new_peer_connection(rtc_config)
        .await
        .map_err(SessionError::PeerConnection)?;

    Ok(Arc::new(peer_connection))
}

/// Finalize the local description (offer or answer must already be set) by
/// waiting for ICE gathering to complete, then return the gathered
/// description, JSON-serialized as the bring-up token.
pub(crate) async fn finalized_local_description_token(
    peer_connection: &Arc<RTCPeerConnection>,
    gather_timeout: std::time::Duration,
) -> SessionResult<String> {
    let mut gather_complete = peer_connection.gathering_complete_promise().await;

    tokio::time::timeout(gather_timeout, gather_complete.recv())
        .await
        .map_err(|_| SessionError::GatheringIncomplete)?;

    let description = peer_connection
        .local_description()
        .await
        .ok_or(SessionError::GatheringIncomplete)?;

    serde_json::to_string(&description).map_err(SessionError::from)
}
