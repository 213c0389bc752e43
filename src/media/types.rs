use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
};

/// Decoded RGB24 frame.
pub type Frame = image::RgbImage;

/// Identity of the video a session opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoSource {
    /// Video file, looped at the end
    File(PathBuf),
    /// Capture device index
    Device(u32),
    /// Built-in moving colour bars. `frames == 0` never ends.
    Pattern { width: u32, height: u32, frames: u64 },
}

impl Display for VideoSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            VideoSource::File(path) => write!(f, "file://{}", path.display()),
            VideoSource::Device(index) => write!(f, "device://{}", index),
            VideoSource::Pattern {
                width,
                height,
                frames,
            } => write!(f, "pattern://{}x{} ({} frames)", width, height, frames),
        }
    }
}
