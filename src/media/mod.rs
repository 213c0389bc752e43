//! Per-frame media path of a streaming session.
//!
//! Data Flow:
//! ```text
//!  FrameSource::read ──► ViewportTransform (crop + downscale) ──► encode_jpeg ──► data URL ──► viewer
//!        ▲                        ▲
//!        │ rewind on EOF          │ ControlState snapshot, once per frame
//!        │ (known frame count)    │
//! ```
//!
//! Everything here is synchronous and CPU bound; sessions run it on the
//! blocking pool.

#[cfg(feature = "ffmpeg")]
pub mod capture;
pub mod encoder;
pub mod pattern;
pub mod source;
pub mod types;
pub mod viewport;
