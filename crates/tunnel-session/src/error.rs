use thiserror::Error;

/// Errors produced while bringing up a session.
///
/// Every bring-up failure here is a `Result`, never a panic.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to construct the peer connection: {0}")]
    PeerConnection(#[source] webrtc::Error),

    #[error("failed to create the local SDP offer/answer: {0}")]
    CreateDescription(#[source] webrtc::Error),

    #[error("failed to set the local description: {0}")]
    SetLocalDescription(#[source] webrtc::Error),

    #[error("failed to set the remote description: {0}")]
    SetRemoteDescription(#[source] webrtc::Error),

    #[error("failed to open the UDP data channel: {0}")]
    OpenDataChannel(#[source] webrtc::Error),

    #[error("invalid bring-up token: {0}")]
    TokenFormat(#[from] serde_json::Error),

    #[error("ICE gathering never completed")]
    GatheringIncomplete,

    #[error("the peer connection closed or failed before reaching Connected")]
    ConnectionFailed,

    #[error("the peer never opened a data channel labeled \"UDP\"")]
    RendezvousFailed,

    #[error("bring-up timed out waiting for {0}")]
    Timeout(&'static str),
}

pub type SessionResult<T> = Result<T, SessionError>;
