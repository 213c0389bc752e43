/// Registers FFmpeg components (format, device, etc.). Call once at startup
/// before opening capture devices like v4l2 or avfoundation.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod capture;
pub mod decoder;
pub mod frame;
pub mod input;
pub mod scaler;
pub mod stream;

pub use capture::Capture;
pub use frame::RgbFrame;
