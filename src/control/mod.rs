//! Viewport control shared between the MQTT subscriber (single writer) and
//! every streaming session (readers).
//!
//! ```text
//!  MQTT topic ──► subscriber ──► ControlDecoder::update ──► ControlState
//!                                                             │ snapshot() once per frame
//!                                      ┌──────────────────────┼──────────────────────┐
//!                                      ▼                      ▼                      ▼
//!                                  session #1             session #2              session #N
//! ```
//!
//! Each field is its own atomic: a write is never observed half done, but the
//! triple as a whole is only eventually consistent across sessions.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

pub mod decoder;
pub mod subscriber;

pub const MIN_ZOOM: f64 = 0.5;
pub const MAX_ZOOM: f64 = 3.0;

/// Zoom, pan and tilt read by a session at the top of one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// 1.0 = full frame, larger = smaller sampled region
    pub zoom: f64,
    /// horizontal offset of the sampled region's center, pixels
    pub pan: i64,
    /// vertical offset of the sampled region's center, pixels
    pub tilt: i64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: 0,
            tilt: 0,
        }
    }
}

/// A single mutation of the control state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ViewportChange {
    /// Absolute zoom level, clamped to `MIN_ZOOM..=MAX_ZOOM`
    Zoom(f64),
    /// Relative horizontal move
    Pan(i64),
    /// Relative vertical move
    Tilt(i64),
}

pub struct ControlState {
    zoom: AtomicU64,
    pan: AtomicI64,
    tilt: AtomicI64,
}

impl ControlState {
    pub fn new() -> Self {
        Self::with_viewport(Viewport::default())
    }

    pub fn with_viewport(viewport: Viewport) -> Self {
        Self {
            zoom: AtomicU64::new(clamp_zoom(viewport.zoom).to_bits()),
            pan: AtomicI64::new(viewport.pan),
            tilt: AtomicI64::new(viewport.tilt),
        }
    }

    pub fn snapshot(&self) -> Viewport {
        Viewport {
            zoom: f64::from_bits(self.zoom.load(Ordering::Relaxed)),
            pan: self.pan.load(Ordering::Relaxed),
            tilt: self.tilt.load(Ordering::Relaxed),
        }
    }

    pub fn apply(&self, change: ViewportChange) {
        match change {
            ViewportChange::Zoom(level) => {
                self.zoom
                    .store(clamp_zoom(level).to_bits(), Ordering::Relaxed);
            }
            ViewportChange::Pan(delta) => add_saturating(&self.pan, delta),
            ViewportChange::Tilt(delta) => add_saturating(&self.tilt, delta),
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_zoom(level: f64) -> f64 {
    if level.is_nan() {
        return 1.0;
    }
    level.clamp(MIN_ZOOM, MAX_ZOOM)
}

fn add_saturating(field: &AtomicI64, delta: i64) {
    // the closure always returns Some, so this cannot fail
    let _ = field.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_add(delta))
    });
}
