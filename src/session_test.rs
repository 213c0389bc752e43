// ============================================================================
// Streaming Session Tests
// ============================================================================

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{PLACEHOLDER, SOURCE_ERROR, SOURCE_NOT_OPENED, Session, SessionEnd, next_session_id};
use crate::{
    config::StreamConfig,
    control::{ControlState, Viewport},
    media::{
        source::{FrameSource, SourceOpener},
        types::{Frame, VideoSource},
    },
    viewer::{Viewer, ViewerGone, close_code},
};

// ------------------------------------------------------------------------
// Test doubles
// ------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl Counters {
    fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
enum Script {
    Finite { frames: usize, loops: bool },
    Endless,
    FailAt(usize),
    /// Endless, every read blocks this long
    SlowReads(Duration),
}

fn solid(index: usize) -> Frame {
    Frame::from_pixel(32, 16, image::Rgb([(index * 50 % 256) as u8, 100, 200]))
}

struct CountingSource {
    script: Script,
    pos: usize,
    counters: Arc<Counters>,
}

impl FrameSource for CountingSource {
    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        match self.script {
            Script::Finite { frames, .. } if self.pos >= frames => return Ok(None),
            Script::FailAt(at) if self.pos >= at => anyhow::bail!("device unplugged"),
            Script::SlowReads(delay) => std::thread::sleep(delay),
            _ => {}
        }
        let frame = solid(self.pos);
        self.pos += 1;
        Ok(Some(frame))
    }

    fn frame_count(&self) -> Option<u64> {
        match self.script {
            Script::Finite {
                frames,
                loops: true,
            } => Some(frames as u64),
            _ => None,
        }
    }

    fn rewind(&mut self) -> anyhow::Result<()> {
        self.pos = 0;
        Ok(())
    }
}

impl Drop for CountingSource {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct CountingOpener {
    script: Script,
    fail: bool,
    delay: Duration,
    counters: Arc<Counters>,
}

impl CountingOpener {
    fn new(script: Script, counters: &Arc<Counters>) -> Self {
        Self {
            script,
            fail: false,
            delay: Duration::ZERO,
            counters: counters.clone(),
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl SourceOpener for CountingOpener {
    fn open(&self, _video: &VideoSource) -> anyhow::Result<Box<dyn FrameSource>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            anyhow::bail!("no such device");
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSource {
            script: self.script,
            pos: 0,
            counters: self.counters.clone(),
        }))
    }
}

struct RecordingViewer {
    sent: mpsc::UnboundedSender<(Instant, String)>,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
    disconnect_after: Option<usize>,
    count: usize,
    gone: CancellationToken,
}

impl Viewer for RecordingViewer {
    async fn send(&mut self, payload: String) -> Result<(), ViewerGone> {
        if self.gone.is_cancelled() || self.disconnect_after == Some(self.count) {
            self.gone.cancel();
            return Err(ViewerGone);
        }
        self.count += 1;
        let _ = self.sent.send((Instant::now(), payload));
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) {
        self.closes.lock().unwrap().push((code, reason.to_string()));
    }

    fn disconnected(&self) -> CancellationToken {
        self.gone.clone()
    }
}

struct Recording {
    rx: mpsc::UnboundedReceiver<(Instant, String)>,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
    gone: CancellationToken,
}

impl Recording {
    fn sends(&mut self) -> Vec<(Instant, String)> {
        let mut sends = Vec::new();
        while let Ok(sent) = self.rx.try_recv() {
            sends.push(sent);
        }
        sends
    }

    fn payloads(&mut self) -> Vec<String> {
        self.sends().into_iter().map(|(_, payload)| payload).collect()
    }

    fn closes(&self) -> Vec<(u16, String)> {
        self.closes.lock().unwrap().clone()
    }
}

fn viewer(disconnect_after: Option<usize>) -> (RecordingViewer, Recording) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closes = Arc::new(Mutex::new(Vec::new()));
    let gone = CancellationToken::new();
    (
        RecordingViewer {
            sent: tx,
            closes: closes.clone(),
            disconnect_after,
            count: 0,
            gone: gone.clone(),
        },
        Recording { rx, closes, gone },
    )
}

fn stream_config(fps: u32) -> StreamConfig {
    StreamConfig::new(
        VideoSource::Pattern {
            width: 32,
            height: 16,
            frames: 0,
        },
        fps,
        80,
        Some(1280),
    )
}

fn session(
    config: StreamConfig,
    opener: Arc<dyn SourceOpener>,
    control: Arc<ControlState>,
    cancel: &CancellationToken,
) -> Session {
    Session::new(next_session_id(), config, control, opener, cancel.child_token())
}

// ------------------------------------------------------------------------
// Opening
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_open_failure_sends_placeholder_and_closes() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(Script::Endless, &counters).failing();
    let (viewer, mut rec) = viewer(None);

    let report = session(
        stream_config(30),
        Arc::new(opener),
        Arc::new(ControlState::new()),
        &CancellationToken::new(),
    )
    .run(viewer)
    .await;

    assert_eq!(report.end, SessionEnd::SourceUnavailable);
    assert_eq!(report.frames_sent, 0);
    assert_eq!(rec.payloads(), vec![PLACEHOLDER.to_string()]);
    assert_eq!(
        rec.closes(),
        vec![(close_code::INTERNAL_ERROR, SOURCE_NOT_OPENED.to_string())]
    );
    assert_eq!(counters.acquired(), 0);
    assert_eq!(counters.released(), 0);
}

#[tokio::test]
async fn test_open_timeout_reports_source_unavailable() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(Script::Endless, &counters).slow(Duration::from_millis(300));
    let config = stream_config(30).with_open_timeout(Some(Duration::from_millis(50)));
    let (viewer, mut rec) = viewer(None);

    let report = session(
        config,
        Arc::new(opener),
        Arc::new(ControlState::new()),
        &CancellationToken::new(),
    )
    .run(viewer)
    .await;

    assert_eq!(report.end, SessionEnd::SourceUnavailable);
    assert_eq!(rec.payloads(), vec![PLACEHOLDER.to_string()]);

    // the late handle is released once the abandoned open finishes
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

// ------------------------------------------------------------------------
// Streaming and exit paths
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_end_of_stream_closes_normally_and_releases_once() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(
        Script::Finite {
            frames: 3,
            loops: false,
        },
        &counters,
    );
    let (viewer, mut rec) = viewer(None);

    let report = session(
        stream_config(1000),
        Arc::new(opener),
        Arc::new(ControlState::new()),
        &CancellationToken::new(),
    )
    .run(viewer)
    .await;

    assert_eq!(report.end, SessionEnd::EndOfStream);
    assert_eq!(report.frames_sent, 3);
    let payloads = rec.payloads();
    assert_eq!(payloads.len(), 3);
    assert!(payloads.iter().all(|p| p.starts_with("data:image/jpeg;base64,")));
    assert_eq!(rec.closes(), vec![(close_code::NORMAL, "End of stream".to_string())]);
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_looping_source_restarts_at_first_frame() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(
        Script::Finite {
            frames: 3,
            loops: true,
        },
        &counters,
    );
    let (viewer, mut rec) = viewer(Some(7));

    let report = session(
        stream_config(1000),
        Arc::new(opener),
        Arc::new(ControlState::new()),
        &CancellationToken::new(),
    )
    .run(viewer)
    .await;

    assert_eq!(report.end, SessionEnd::ViewerGone);
    assert_eq!(report.frames_sent, 7);
    let payloads = rec.payloads();
    assert_eq!(payloads.len(), 7);
    assert_ne!(payloads[0], payloads[1]);
    assert_eq!(payloads[3], payloads[0]);
    assert_eq!(payloads[4], payloads[1]);
    assert_eq!(payloads[6], payloads[0]);
    // a disconnected viewer gets no close frame
    assert!(rec.closes().is_empty());
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_disconnect_during_pacing_releases_source() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(Script::Endless, &counters);
    let (viewer, mut rec) = viewer(None);
    let session = session(
        stream_config(1),
        Arc::new(opener),
        Arc::new(ControlState::new()),
        &CancellationToken::new(),
    );

    let handle = tokio::spawn(session.run(viewer));
    assert!(rec.rx.recv().await.is_some());
    rec.gone.cancel();

    let report = tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("session should stop without waiting for the next frame")
        .unwrap();
    assert_eq!(report.end, SessionEnd::ViewerGone);
    assert_eq!(report.frames_sent, 1);
    assert!(rec.closes().is_empty());
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_going_away() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(Script::Endless, &counters);
    let cancel = CancellationToken::new();
    let (viewer, mut rec) = viewer(None);
    let session = session(stream_config(1), Arc::new(opener), Arc::new(ControlState::new()), &cancel);

    let handle = tokio::spawn(session.run(viewer));
    assert!(rec.rx.recv().await.is_some());
    cancel.cancel();

    let report = tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("session should observe shutdown")
        .unwrap();
    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(
        rec.closes(),
        vec![(close_code::GOING_AWAY, "Server shutting down".to_string())]
    );
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_shutdown_during_read_releases_source_before_returning() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(Script::SlowReads(Duration::from_millis(400)), &counters);
    let cancel = CancellationToken::new();
    let (viewer, mut rec) = viewer(None);
    let session = session(stream_config(1000), Arc::new(opener), Arc::new(ControlState::new()), &cancel);

    let handle = tokio::spawn(session.run(viewer));
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let report = handle.await.unwrap();
    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(report.frames_sent, 0);
    assert!(rec.payloads().is_empty());
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_disconnect_during_read_releases_source_before_returning() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(Script::SlowReads(Duration::from_millis(400)), &counters);
    let (viewer, rec) = viewer(None);
    let session = session(
        stream_config(1000),
        Arc::new(opener),
        Arc::new(ControlState::new()),
        &CancellationToken::new(),
    );

    let handle = tokio::spawn(session.run(viewer));
    tokio::time::sleep(Duration::from_millis(100)).await;
    rec.gone.cancel();

    let report = handle.await.unwrap();
    assert_eq!(report.end, SessionEnd::ViewerGone);
    assert!(rec.closes().is_empty());
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_source_error_closes_with_internal_error() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(Script::FailAt(2), &counters);
    let (viewer, mut rec) = viewer(None);

    let report = session(
        stream_config(1000),
        Arc::new(opener),
        Arc::new(ControlState::new()),
        &CancellationToken::new(),
    )
    .run(viewer)
    .await;

    assert!(matches!(report.end, SessionEnd::Failed(_)));
    assert_eq!(report.frames_sent, 2);
    assert_eq!(rec.payloads().len(), 2);
    assert_eq!(
        rec.closes(),
        vec![(close_code::INTERNAL_ERROR, SOURCE_ERROR.to_string())]
    );
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_empty_viewport_skips_frames_without_ending_session() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(
        Script::Finite {
            frames: 3,
            loops: false,
        },
        &counters,
    );
    let control = Arc::new(ControlState::with_viewport(Viewport {
        zoom: 1.0,
        pan: 10_000,
        tilt: 0,
    }));
    let (viewer, mut rec) = viewer(None);

    let report = session(stream_config(1000), Arc::new(opener), control, &CancellationToken::new())
        .run(viewer)
        .await;

    assert_eq!(report.end, SessionEnd::EndOfStream);
    assert_eq!(report.frames_sent, 0);
    assert_eq!(report.frames_skipped, 3);
    assert!(rec.payloads().is_empty());
    assert_eq!(counters.released(), 1);
}

// ------------------------------------------------------------------------
// Pacing and isolation
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_pacing_spaces_frames_at_target_rate() {
    let counters = Arc::new(Counters::default());
    let opener = CountingOpener::new(
        Script::Finite {
            frames: 10,
            loops: false,
        },
        &counters,
    );
    let config = stream_config(30);
    let interval = config.frame_interval();
    let (viewer, mut rec) = viewer(None);

    let report = session(config, Arc::new(opener), Arc::new(ControlState::new()), &CancellationToken::new())
        .run(viewer)
        .await;
    assert_eq!(report.frames_sent, 10);

    let sends = rec.sends();
    let span = sends[9].0 - sends[0].0;
    assert!(
        span >= interval.mul_f64(9.0 * 0.9),
        "10 frames at 30 fps arrived within {:?}",
        span
    );
}

#[tokio::test]
async fn test_concurrent_sessions_use_independent_sources() {
    let counters = Arc::new(Counters::default());
    let script = Script::Finite {
        frames: 5,
        loops: false,
    };
    let opener: Arc<dyn SourceOpener> = Arc::new(CountingOpener::new(script, &counters));
    let control = Arc::new(ControlState::new());
    let cancel = CancellationToken::new();
    let (viewer_a, mut rec_a) = viewer(None);
    let (viewer_b, mut rec_b) = viewer(None);

    let a = session(
        stream_config(200),
        opener.clone(),
        control.clone(),
        &cancel,
    );
    let b = session(
        stream_config(200),
        opener.clone(),
        control.clone(),
        &cancel,
    );
    let (report_a, report_b) = tokio::join!(
        tokio::spawn(a.run(viewer_a)),
        tokio::spawn(b.run(viewer_b))
    );

    assert_ne!(report_a.as_ref().unwrap().id, report_b.as_ref().unwrap().id);
    assert_eq!(report_a.unwrap().frames_sent, 5);
    assert_eq!(report_b.unwrap().frames_sent, 5);
    // each viewer sees the whole sequence from the first frame
    assert_eq!(rec_a.payloads(), rec_b.payloads());
    assert_eq!(counters.acquired(), 2);
    assert_eq!(counters.released(), 2);
}
