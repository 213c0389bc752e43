use ffmpeg_next::{Packet, frame::Video};

use crate::stream::VideoStream;

pub struct Decoder {
    inner: ffmpeg_next::codec::decoder::Video,
}

unsafe impl Send for Decoder {}

impl Decoder {
    pub fn new(stream: &VideoStream) -> anyhow::Result<Self> {
        let mut decoder_ctx = ffmpeg_next::codec::Context::new();
        decoder_ctx.set_parameters(stream.parameters().clone())?;
        let video_decoder = decoder_ctx.decoder().video()?;

        if video_decoder.format() == ffmpeg_next::format::Pixel::None
            || video_decoder.width() == 0
            || video_decoder.height() == 0
        {
            return Err(anyhow::anyhow!("missing codec parameters"));
        }

        Ok(Self {
            inner: video_decoder,
        })
    }

    pub fn send_packet(&mut self, packet: &Packet) -> anyhow::Result<()> {
        self.inner.send_packet(packet)?;
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    /// `Ok(None)` means the decoder needs more input, or is fully drained after EOF.
    pub fn receive_frame(&mut self) -> anyhow::Result<Option<Video>> {
        let mut frame = Video::empty();
        match self.inner.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Drops buffered frames and clears the EOF state, required after a seek.
    pub fn flush(&mut self) {
        self.inner.flush();
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }
}
