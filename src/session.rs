//! One streaming session per connected viewer.
//!
//! ```text
//!  Opening ──open ok──► Streaming ──EOF / gone / cancel / error──► Closed
//!     │
//!     └──open failed──► FailedOpen (placeholder + close 1011)
//! ```
//!
//! The frame source lives inside [`FramePipeline`], which is moved into the
//! blocking pool for every frame and handed back with the result. Whoever holds
//! it last drops it, so the capture handle is released exactly once on every
//! exit path. A session interrupted mid-frame waits for the worker, so the
//! handle is gone before `run` returns.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use crate::{
    config::StreamConfig,
    control::{ControlState, Viewport},
    media::{
        encoder::encode_frame,
        source::{FrameSource, SourceOpener, read_looping},
        viewport::ViewportTransform,
    },
    viewer::{Viewer, close_code},
};

/// Grey 640x360 SVG reading "Source not opened".
pub const PLACEHOLDER: &str = "data:image/svg+xml;base64,PD94bWwgdmVyc2lvbj0iMS4wIiBlbmNvZGluZz0iVVRGLTgiPz48c3ZnIHdpZHRoPSI2NDAiIGhlaWdodD0iMzYwIiB2aWV3Qm94PSIwIDAgNjQwIDM2MCIgeG1sbnM9Imh0dHA6Ly93d3cudzMub3JnLzIwMDAvc3ZnIj48cmVjdCB3aWR0aD0iNjQwIiBoZWlnaHQ9IjM2MCIgZmlsbD0iI0IyQjJCMiIvPjx0ZXh0IHg9IjMyMCIgeT0iMTgwIiBmaWxsPSIjZmZmIiBmb250LXNpemU9IjI0IiB0ZXh0LWFuY2hvcj0ibWlkZGxlIj5Tb3VyY2Ugbm90IG9wZW5lZDwvdGV4dD48L3N2Zz4=";

pub const SOURCE_NOT_OPENED: &str = "Video source not opened";
pub const SOURCE_ERROR: &str = "Video source error";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Streaming,
    Closed,
    FailedOpen,
}

/// Why a session stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// Source exhausted and not loopable
    EndOfStream,
    ViewerGone,
    /// Server shutdown
    Cancelled,
    SourceUnavailable,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct SessionReport {
    pub id: u64,
    pub end: SessionEnd,
    pub frames_sent: u64,
    pub frames_skipped: u64,
}

enum Step {
    Frame(String),
    Skipped,
    EndOfStream,
}

/// Source plus the synchronous per-frame work.
struct FramePipeline {
    source: Box<dyn FrameSource>,
    transform: ViewportTransform,
    quality: u8,
}

impl FramePipeline {
    fn step(&mut self, viewport: Viewport) -> anyhow::Result<Step> {
        let Some(frame) = read_looping(self.source.as_mut())? else {
            return Ok(Step::EndOfStream);
        };
        let (width, height) = frame.dimensions();
        let Some(frame) = self.transform.apply(frame, &viewport) else {
            log::debug!(
                "empty viewport on {}x{} frame ({:?}), skipping",
                width,
                height,
                viewport
            );
            return Ok(Step::Skipped);
        };
        match encode_frame(&frame, self.quality) {
            Ok(payload) => Ok(Step::Frame(payload)),
            Err(e) => {
                log::debug!("encode failed, skipping frame: {:#}", e);
                Ok(Step::Skipped)
            }
        }
    }
}

pub struct Session {
    id: u64,
    config: StreamConfig,
    control: Arc<ControlState>,
    opener: Arc<dyn SourceOpener>,
    cancel: CancellationToken,
    state: SessionState,
    frames_sent: u64,
    frames_skipped: u64,
}

impl Session {
    pub fn new(
        id: u64,
        config: StreamConfig,
        control: Arc<ControlState>,
        opener: Arc<dyn SourceOpener>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            config,
            control,
            opener,
            cancel,
            state: SessionState::Opening,
            frames_sent: 0,
            frames_skipped: 0,
        }
    }

    /// Streams to `viewer` until end of stream, disconnect, shutdown or a
    /// source failure.
    pub async fn run<V: Viewer>(mut self, mut viewer: V) -> SessionReport {
        log::info!("session {}: opening {}", self.id, self.config.video());

        let opened = tokio::select! {
            _ = self.cancel.cancelled() => None,
            opened = self.open() => Some(opened),
        };
        let end = match opened {
            None => {
                viewer.close(close_code::GOING_AWAY, "Server shutting down").await;
                self.transition(SessionState::Closed);
                SessionEnd::Cancelled
            }
            Some(Err(e)) => {
                log::warn!("session {}: {}: {:#}", self.id, SOURCE_NOT_OPENED, e);
                if viewer.send(PLACEHOLDER.to_string()).await.is_ok() {
                    viewer
                        .close(close_code::INTERNAL_ERROR, SOURCE_NOT_OPENED)
                        .await;
                }
                self.transition(SessionState::FailedOpen);
                SessionEnd::SourceUnavailable
            }
            Some(Ok(source)) => {
                self.transition(SessionState::Streaming);
                let pipeline = FramePipeline {
                    source,
                    transform: ViewportTransform::new(self.config.max_width()),
                    quality: self.config.quality(),
                };
                let end = self.stream(pipeline, &mut viewer).await;
                match &end {
                    SessionEnd::EndOfStream => {
                        viewer.close(close_code::NORMAL, "End of stream").await
                    }
                    SessionEnd::Cancelled => {
                        viewer.close(close_code::GOING_AWAY, "Server shutting down").await
                    }
                    SessionEnd::Failed(_) => {
                        viewer.close(close_code::INTERNAL_ERROR, SOURCE_ERROR).await
                    }
                    SessionEnd::ViewerGone | SessionEnd::SourceUnavailable => {}
                }
                self.transition(SessionState::Closed);
                end
            }
        };

        let report = SessionReport {
            id: self.id,
            end,
            frames_sent: self.frames_sent,
            frames_skipped: self.frames_skipped,
        };
        log::info!(
            "session {}: finished ({:?}), {} frames sent, {} skipped",
            report.id,
            report.end,
            report.frames_sent,
            report.frames_skipped
        );
        report
    }

    async fn open(&self) -> anyhow::Result<Box<dyn FrameSource>> {
        let opener = self.opener.clone();
        let video = self.config.video().clone();
        let task = tokio::task::spawn_blocking(move || opener.open(&video));

        // a late handle is dropped with the detached task
        let joined = match self.config.open_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, task)
                .await
                .map_err(|_| anyhow!("timed out after {:?}", timeout))?,
            None => task.await,
        };
        joined.map_err(|e| anyhow!("open worker failed: {}", e))?
    }

    async fn stream<V: Viewer>(&mut self, mut pipeline: FramePipeline, viewer: &mut V) -> SessionEnd {
        let interval = self.config.frame_interval();
        let gone = viewer.disconnected();

        loop {
            let started = Instant::now();
            let viewport = self.control.snapshot();

            let mut work = tokio::task::spawn_blocking(move || {
                let step = pipeline.step(viewport);
                (pipeline, step)
            });
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(SessionEnd::Cancelled),
                _ = gone.cancelled() => Err(SessionEnd::ViewerGone),
                joined = &mut work => Ok(joined),
            };
            let step = match joined {
                Ok(Ok((returned, step))) => {
                    pipeline = returned;
                    step
                }
                Ok(Err(e)) => {
                    log::error!("session {}: frame worker failed: {}", self.id, e);
                    return SessionEnd::Failed(e.to_string());
                }
                Err(end) => {
                    // the worker owns the source until its read returns
                    log::debug!("session {}: {:?} during frame, waiting for source", self.id, end);
                    let _ = work.await;
                    return end;
                }
            };

            match step {
                Ok(Step::EndOfStream) => return SessionEnd::EndOfStream,
                Ok(Step::Skipped) => self.frames_skipped += 1,
                Ok(Step::Frame(payload)) => {
                    let sent = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                        sent = viewer.send(payload) => sent,
                    };
                    if sent.is_err() {
                        return SessionEnd::ViewerGone;
                    }
                    self.frames_sent += 1;
                }
                Err(e) => {
                    log::error!("session {}: source read failed: {:#}", self.id, e);
                    return SessionEnd::Failed(format!("{:#}", e));
                }
            }

            let remaining = interval.saturating_sub(started.elapsed());
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                _ = gone.cancelled() => return SessionEnd::ViewerGone,
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
