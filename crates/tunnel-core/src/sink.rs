//! Abstraction over "the reliable, ordered datagram channel" so that
//! [`crate::Multiplexer`] never has to know whether it is talking to a real
//! WebRTC data channel or a fake used in tests.

use async_trait::async_trait;

/// A send-only handle to the negotiated reliable datagram channel.
///
/// Implementations must preserve the order in which [`send`](DataChannelSink::send)
/// is called — the multiplexer relies on `NewClient` arriving before the
/// first `Data` for the same client id (see crate-level docs).
#[async_trait]
pub trait DataChannelSink: Send + Sync {
    /// Send one already-encoded tunnel packet. Errors are logged by the
    /// caller and do not tear down the tunnel.
    async fn send(&self, bytes: Vec<u8>) -> std::io::Result<()>;
}
