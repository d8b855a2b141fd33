use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::packet::{FrameCodec, Packet};

/// Drains `rx` into the socket until the queue closes, a CLOSE has been
/// written, or `cancel` fires. Packets already queued when `cancel` fires
/// are still flushed so a trailing CLOSE reaches the peer.
pub(crate) async fn write_loop<W>(
    writer: W,
    mut rx: UnboundedReceiver<Packet>,
    cancel: CancellationToken,
    label: String,
) where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, FrameCodec::new());
    loop {
        let packet = tokio::select! {
            biased;
            p = rx.recv() => match p {
                Some(p) => p,
                None => break,
            },
            _ = cancel.cancelled() => {
                while let Ok(p) = rx.try_recv() {
                    let last = matches!(p, Packet::Close(_));
                    if sink.send(p).await.is_err() || last {
                        break;
                    }
                }
                break;
            }
        };

        let last = matches!(packet, Packet::Close(_));
        debug!("{label} -> {packet}");
        if let Err(e) = sink.send(packet).await {
            debug!("{label} write failed: {e}");
            break;
        }
        if last {
            break;
        }
    }
    let _ = sink.close().await;
    debug!("{label} writer stopped");
}
