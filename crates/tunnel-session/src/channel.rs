//! Bridges a `webrtc` data channel to [`tunnel_core::DataChannelSink`] and
//! wires its message/close events into a [`Multiplexer`].

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::Arc;
use tokio::sync::oneshot;
use tunnel_core::{DataChannelSink, Multiplexer};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

use crate::error::{SessionError, SessionResult};

struct WebRtcSink {
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannelSink for WebRtcSink {
    async fn send(&self, bytes: Vec<u8>) -> io::Result<()> {
        self.channel
            .send(&Bytes::from(bytes))
            .await
            .map(|_| ())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))
    }
}

/// Build a [`Multiplexer`] backed by `channel`, and register the message and
/// close handlers that feed it. The returned multiplexer is ready to use as
/// soon as `channel` itself is open.
pub(crate) fn attach_multiplexer(channel: Arc<RTCDataChannel>) -> Arc<Multiplexer> {
    let multiplexer = Arc::new(Multiplexer::new(Arc::new(WebRtcSink {
        channel: channel.clone(),
    })));

    {
        let multiplexer = multiplexer.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let multiplexer = multiplexer.clone();
            Box::pin(async move {
                multiplexer.on_message(&msg.data).await;
            })
        }));
    }

    {
        let multiplexer = multiplexer.clone();
        channel.on_close(Box::new(move || {
            let multiplexer = multiplexer.clone();
            Box::pin(async move {
                multiplexer.stop().await;
            })
        }));
    }

    multiplexer
}

/// Wait for `channel` to reach the open state, bounded by `timeout`.
pub(crate) async fn wait_for_open(
    channel: &Arc<RTCDataChannel>,
    timeout: std::time::Duration,
) -> SessionResult<()> {
    let (tx, rx) = oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    channel.on_open(Box::new(move || {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        Box::pin(async {})
    }));

    tokio::time::timeout(timeout, rx)
        .await
        .map_err(|_| SessionError::Timeout("data channel open"))?
        .map_err(|_| SessionError::RendezvousFailed)
}
