use crate::media::{
    pattern::PatternSource,
    types::{Frame, VideoSource},
};

/// Sequential frame producer owned by exactly one session.
///
/// Dropping the value releases the underlying capture handle.
pub trait FrameSource: Send {
    /// Next frame, `Ok(None)` once the source is exhausted.
    fn read(&mut self) -> anyhow::Result<Option<Frame>>;

    /// Total frames when known. A positive count means the source can loop.
    fn frame_count(&self) -> Option<u64>;

    /// Restart from the first frame.
    fn rewind(&mut self) -> anyhow::Result<()>;
}

/// Opens a fresh, independent [`FrameSource`] per call.
pub trait SourceOpener: Send + Sync {
    fn open(&self, video: &VideoSource) -> anyhow::Result<Box<dyn FrameSource>>;
}

/// Reads the next frame, starting over once when a loopable source runs out.
///
/// `Ok(None)` is the end of the stream: either the source has no known frame
/// count (live device) or it is still empty after the rewind.
pub fn read_looping(source: &mut dyn FrameSource) -> anyhow::Result<Option<Frame>> {
    if let Some(frame) = source.read()? {
        return Ok(Some(frame));
    }

    match source.frame_count() {
        Some(count) if count > 0 => {
            log::debug!("source exhausted after {} frames, looping", count);
            source.rewind()?;
            source.read()
        }
        _ => Ok(None),
    }
}

/// Opener used by the server: patterns are built in, files and devices go
/// through ffmpeg when the `ffmpeg` feature is enabled.
#[derive(Default)]
pub struct DefaultOpener;

impl SourceOpener for DefaultOpener {
    fn open(&self, video: &VideoSource) -> anyhow::Result<Box<dyn FrameSource>> {
        match video {
            VideoSource::Pattern {
                width,
                height,
                frames,
            } => Ok(Box::new(PatternSource::new(*width, *height, *frames)?)),
            #[cfg(feature = "ffmpeg")]
            VideoSource::File(path) => Ok(Box::new(
                crate::media::capture::CaptureSource::open_file(path)?,
            )),
            #[cfg(feature = "ffmpeg")]
            VideoSource::Device(index) => Ok(Box::new(
                crate::media::capture::CaptureSource::open_device(*index)?,
            )),
            #[cfg(not(feature = "ffmpeg"))]
            VideoSource::File(_) | VideoSource::Device(_) => Err(anyhow::anyhow!(
                "{} needs the `ffmpeg` feature, this build only has the test pattern",
                video
            )),
        }
    }
}
