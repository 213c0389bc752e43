use std::{fmt, future::Future};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// WebSocket close codes used by sessions.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// The viewer closed the connection or it broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewerGone;

impl fmt::Display for ViewerGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("viewer disconnected")
    }
}

impl std::error::Error for ViewerGone {}

/// Receiving end of a streaming session.
pub trait Viewer: Send {
    fn send(&mut self, payload: String) -> impl Future<Output = Result<(), ViewerGone>> + Send;

    /// Best effort; a viewer that is already gone is not an error.
    fn close(&mut self, code: u16, reason: &str) -> impl Future<Output = ()> + Send;

    /// Fires once the peer closed or the connection dropped.
    fn disconnected(&self) -> CancellationToken;
}

/// [`Viewer`] over an upgraded axum WebSocket.
///
/// The read half is drained by its own task so close frames and pings are
/// handled while the session only writes.
pub struct WsViewer {
    sink: SplitSink<WebSocket, Message>,
    disconnected: CancellationToken,
    reader: JoinHandle<()>,
}

impl WsViewer {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, mut stream) = socket.split();
        let disconnected = CancellationToken::new();

        let token = disconnected.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Close(frame)) => {
                        log::debug!("viewer sent close: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::debug!("viewer read error: {}", e);
                        break;
                    }
                }
            }
            token.cancel();
        });

        Self {
            sink,
            disconnected,
            reader,
        }
    }
}

impl Viewer for WsViewer {
    async fn send(&mut self, payload: String) -> Result<(), ViewerGone> {
        if self.disconnected.is_cancelled() {
            return Err(ViewerGone);
        }
        self.sink
            .send(Message::Text(payload.into()))
            .await
            .map_err(|_| ViewerGone)
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        if let Err(e) = self.sink.send(Message::Close(Some(frame))).await {
            log::debug!("close frame not delivered: {}", e);
        }
        let _ = self.sink.close().await;
    }

    fn disconnected(&self) -> CancellationToken {
        self.disconnected.clone()
    }
}

impl Drop for WsViewer {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
