use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::StreamConfig,
    control::ControlState,
    media::source::SourceOpener,
    session::{Session, next_session_id},
    viewer::WsViewer,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub stream: StreamConfig,
    pub control: Arc<ControlState>,
    pub opener: Arc<dyn SourceOpener>,
    pub cancel: CancellationToken,
    /// Every running session, waited on at shutdown
    pub sessions: TaskTracker,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(stream_ws))
        .route("/{*path}", get(stream_ws))
        .with_state(state)
}

/// Binds `listen` and serves viewers until `cancel` fires.
pub(crate) async fn start_api_server(
    listen: &str,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let listener = TcpListener::bind(listen).await?;
    log::info!("WebSocket server started on ws://{}", listener.local_addr()?);
    Ok(serve(listener, state, cancel))
}

pub(crate) fn serve(listener: TcpListener, state: AppState, cancel: CancellationToken) -> JoinHandle<()> {
    let app = router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("Error running WebSocket server: {}", e);
        }
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Shutting down WebSocket server...");
}

async fn stream_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| {
        sessions.track_future(async move {
            let session = Session::new(
                next_session_id(),
                state.stream,
                state.control,
                state.opener,
                state.cancel.child_token(),
            );
            session.run(WsViewer::new(socket)).await;
        })
    })
}
