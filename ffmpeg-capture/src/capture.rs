use std::path::Path;

use crate::{decoder::Decoder, frame::RgbFrame, input::AvInput, scaler::Scaler};

/// A sequential RGB24 frame reader over one file or capture device.
///
/// The underlying demuxer and codec contexts are released when the value is
/// dropped.
pub struct Capture {
    label: String,
    input: AvInput,
    decoder: Decoder,
    scaler: Option<Scaler>,
    eof_sent: bool,
}

impl Capture {
    pub fn open_file(path: &Path) -> anyhow::Result<Self> {
        let url = path.to_string_lossy().into_owned();
        let input = AvInput::open(&url, None, None)?;
        Self::from_input(url, input)
    }

    /// Opens capture device `index` with the platform's native grabber.
    pub fn open_device(index: u32) -> anyhow::Result<Self> {
        let (format, url) = device_url(index)?;
        let input = AvInput::open(&url, Some(format), None)?;
        Self::from_input(format!("{}:{}", format, url), input)
    }

    fn from_input(label: String, input: AvInput) -> anyhow::Result<Self> {
        let decoder = Decoder::new(input.video())?;
        log::info!(
            "capture opened: {} ({}x{}, fps={:.2}, frames={:?})",
            label,
            decoder.width(),
            decoder.height(),
            input.video().fps(),
            input.video().frame_count()
        );
        Ok(Self {
            label,
            input,
            decoder,
            scaler: None,
            eof_sent: false,
        })
    }

    pub fn frame_count(&self) -> Option<u64> {
        self.input.video().frame_count()
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    /// Next decoded frame, `Ok(None)` once the input is exhausted.
    pub fn read_frame(&mut self) -> anyhow::Result<Option<RgbFrame>> {
        loop {
            if let Some(frame) = self.decoder.receive_frame()? {
                return self.to_rgb(&frame).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            match self.input.read_video_packet() {
                Some(packet) => {
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        // corrupt packets are skipped, the next keyframe resyncs
                        log::debug!("capture {}: send packet error: {:#}", self.label, e);
                    }
                }
                None => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
            }
        }
    }

    /// Seeks to the first frame so the next read starts over.
    pub fn rewind(&mut self) -> anyhow::Result<()> {
        self.input.seek_to_start()?;
        self.decoder.flush();
        self.eof_sent = false;
        Ok(())
    }

    fn to_rgb(&mut self, frame: &ffmpeg_next::frame::Video) -> anyhow::Result<RgbFrame> {
        let rebuild = match &self.scaler {
            Some(scaler) => !scaler.accepts(frame),
            None => true,
        };
        if rebuild {
            self.scaler = Some(Scaler::rgb24(frame.format(), frame.width(), frame.height())?);
        }

        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("scaler not initialized"))?;
        let rgb = scaler.run(frame)?;
        Ok(RgbFrame::from_video(&rgb))
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        log::debug!("capture released: {}", self.label);
    }
}

#[cfg(target_os = "linux")]
fn device_url(index: u32) -> anyhow::Result<(&'static str, String)> {
    Ok(("v4l2", format!("/dev/video{}", index)))
}

#[cfg(target_os = "macos")]
fn device_url(index: u32) -> anyhow::Result<(&'static str, String)> {
    Ok(("avfoundation", format!("{}", index)))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn device_url(index: u32) -> anyhow::Result<(&'static str, String)> {
    Err(anyhow::anyhow!(
        "capture device index {} is not supported on this platform",
        index
    ))
}

#[cfg(test)]
#[path = "capture_test.rs"]
mod capture_test;
