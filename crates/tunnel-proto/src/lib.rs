//! Wire framing for the UDP tunnel's reliable data channel.
//!
//! A [`TunnelPacket`] is a tagged union of two message kinds: [`NewClient`]
//! (minted once per flow, announces the remote destination) and [`Data`]
//! (a UDP payload travelling in either direction). The encoding is protobuf,
//! generated at build time from `proto/tunnel.proto` via `prost-build`.

mod proto {
    include!(concat!(env!("OUT_DIR"), "/tunnel.rs"));
}

pub use proto::{tunnel_packet::Payload, Data, NewClient, TunnelPacket};

use thiserror::Error;

/// Errors produced while decoding a [`TunnelPacket`] off the wire.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed tunnel packet: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("tunnel packet carried no payload")]
    EmptyPayload,
}

/// Encode a [`TunnelPacket`] into its wire representation.
pub fn encode(packet: &TunnelPacket) -> Vec<u8> {
    prost::Message::encode_to_vec(packet)
}

/// Decode a [`TunnelPacket`] from its wire representation.
///
/// Rejects packets with no `payload` variant set — the source never sends
/// these, and treating one as well-formed would silently drop a packet the
/// caller expected to route.
pub fn decode(bytes: &[u8]) -> Result<TunnelPacket, CodecError> {
    let packet: TunnelPacket = prost::Message::decode(bytes)?;
    if packet.payload.is_none() {
        return Err(CodecError::EmptyPayload);
    }
    Ok(packet)
}

/// Build a `NewClient` packet.
pub fn new_client(client_id: u32, remote_addr: impl Into<String>, remote_port: u16) -> TunnelPacket {
    TunnelPacket {
        payload: Some(Payload::NewClient(NewClient {
            client_id,
            remote_addr: remote_addr.into(),
            remote_port: remote_port as u32,
        })),
    }
}

/// Build a `Data` packet.
pub fn data(client_id: u32, is_response: bool, bytes: Vec<u8>) -> TunnelPacket {
    TunnelPacket {
        payload: Some(Payload::Data(Data {
            client_id,
            is_response,
            data: bytes,
        })),
    }
}
