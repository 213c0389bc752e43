use std::path::Path;

use ffmpeg_capture::{Capture, RgbFrame};

use crate::media::{source::FrameSource, types::Frame};

/// File or device source decoded by ffmpeg.
pub struct CaptureSource {
    inner: Capture,
}

impl CaptureSource {
    pub fn open_file(path: &Path) -> anyhow::Result<Self> {
        let inner = Capture::open_file(path)
            .map_err(|e| anyhow::anyhow!("open {}: {:#}", path.display(), e))?;
        Ok(Self { inner })
    }

    pub fn open_device(index: u32) -> anyhow::Result<Self> {
        let inner = Capture::open_device(index)
            .map_err(|e| anyhow::anyhow!("open device {}: {:#}", index, e))?;
        Ok(Self { inner })
    }
}

fn into_frame(frame: RgbFrame) -> anyhow::Result<Frame> {
    let (width, height) = (frame.width, frame.height);
    Frame::from_raw(width, height, frame.data)
        .ok_or_else(|| anyhow::anyhow!("short RGB buffer for {}x{}", width, height))
}

impl FrameSource for CaptureSource {
    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        self.inner.read_frame()?.map(into_frame).transpose()
    }

    fn frame_count(&self) -> Option<u64> {
        self.inner.frame_count()
    }

    fn rewind(&mut self) -> anyhow::Result<()> {
        self.inner.rewind()
    }
}
