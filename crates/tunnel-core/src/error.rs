use thiserror::Error;

/// Errors produced by the tunnel multiplexer.
///
/// Most variants are logged and absorbed by the caller rather than
/// propagated — see the policy table in the forwarder/remote modules for
/// which failures are fatal to a single flow versus the whole tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("failed to bind forwarder on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("a forwarder rule is already installed on port {0}")]
    PortInUse(u16),

    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{host} resolved to no usable addresses")]
    NoResolvedAddress { host: String },

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to send on the data channel: {0}")]
    Send(String),

    #[error("malformed tunnel packet: {0}")]
    Decode(#[from] tunnel_proto::CodecError),
}

pub type TunnelResult<T> = Result<T, TunnelError>;
