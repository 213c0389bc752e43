use std::{io::Write, sync::Arc, time::Duration};

use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    api::AppState,
    config::{AppConfig, Args},
    control::{ControlState, decoder::ControlDecoder, subscriber::start_control_subscriber},
    media::source::DefaultOpener,
};

mod api;
mod config;
mod control;
mod media;
mod session;
mod viewer;

/// How long open sessions get to send their close frames after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(feature = "ffmpeg")]
fn init_media() -> anyhow::Result<()> {
    ffmpeg_capture::init()
}

#[cfg(not(feature = "ffmpeg"))]
fn init_media() -> anyhow::Result<()> {
    Ok(())
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let config = AppConfig::from_args(Args::parse());

    if let Err(e) = init_media() {
        log::error!("ffmpeg init failed: {:#}", e);
        std::process::exit(1);
    }

    let cancel = CancellationToken::new();
    let control = Arc::new(ControlState::new());

    let subscriber = match config.control() {
        Some(channel) => {
            let decoder = Arc::new(ControlDecoder::new(channel.camera_id(), control.clone()));
            Some(start_control_subscriber(channel, decoder, cancel.child_token()))
        }
        None => {
            log::info!("control channel disabled");
            None
        }
    };

    let state = AppState {
        stream: config.stream().clone(),
        control,
        opener: Arc::new(DefaultOpener),
        cancel: cancel.clone(),
        sessions: TaskTracker::new(),
    };
    let sessions = state.sessions.clone();
    log::info!(
        "streaming {} at {} fps, quality {}",
        config.stream().video(),
        config.stream().fps(),
        config.stream().quality()
    );
    let server = match api::start_api_server(config.listen(), state, cancel.clone()).await {
        Ok(server) => server,
        Err(e) => {
            log::error!("cannot listen on {}: {:#}", config.listen(), e);
            std::process::exit(1);
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    drain(server, sessions, subscriber).await;
    std::process::exit(0);
}

/// Waits for the server, every session and the subscriber to wind down after
/// cancellation, up to `SHUTDOWN_GRACE`.
async fn drain(server: JoinHandle<()>, sessions: TaskTracker, subscriber: Option<JoinHandle<()>>) {
    sessions.close();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = server.await;
        sessions.wait().await;
        if let Some(subscriber) = subscriber {
            let _ = subscriber.await;
        }
    })
    .await;

    match drained {
        Ok(()) => log::info!("shutdown complete"),
        Err(_) => log::warn!(
            "{} session(s) still open after {:?}, exiting",
            sessions.len(),
            SHUTDOWN_GRACE
        ),
    }
}
