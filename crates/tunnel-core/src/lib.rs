//! The UDP-over-data-channel multiplexer.
//!
//! [`Multiplexer`] demultiplexes many concurrent UDP client flows onto one
//! logical [`DataChannelSink`], allocating per-flow client ids on the
//! originating side and lazily dialing egress sockets on first packet on
//! the destination side. It is transport-agnostic: `tunnel-session` supplies
//! the concrete [`DataChannelSink`] backed by a WebRTC data channel.

mod error;
mod multiplexer;
mod resolver;
mod sink;

pub use error::{TunnelError, TunnelResult};
pub use multiplexer::Multiplexer;
pub use sink::DataChannelSink;
