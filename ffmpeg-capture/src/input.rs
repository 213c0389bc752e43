use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::{Dictionary, Packet};

use crate::stream::VideoStream;

/// Demuxer bound to the best video stream of one input.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    video: VideoStream,
}

unsafe impl Send for AvInput {}

impl AvInput {
    /// Resolve input format by name (e.g. "v4l2", "avfoundation") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> anyhow::Result<ffmpeg_next::format::format::Input> {
        let cname = CString::new(name)
            .map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(anyhow::anyhow!("input format not found: {}", name));
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    pub fn open(
        url: &str,
        format: Option<&str>,
        options: Option<Dictionary>,
    ) -> anyhow::Result<Self> {
        use ffmpeg_next::format::format::Format;

        let path = Path::new(url);
        let input = match (format, options) {
            (Some(fmt_name), opts) => {
                let fmt = Self::find_input_format(fmt_name)?;
                let ctx = ffmpeg_next::format::open_with(
                    path,
                    &Format::Input(fmt),
                    opts.unwrap_or_default(),
                )?;
                ctx.input()
            }
            (None, Some(opts)) => ffmpeg_next::format::input_with_dictionary(path, opts)?,
            (None, None) => ffmpeg_next::format::input(path)?,
        };

        let video = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .and_then(|stream| VideoStream::probe(&stream))
            .ok_or_else(|| anyhow::anyhow!("no video stream in {}", url))?;

        Ok(Self {
            inner: input,
            video,
        })
    }

    pub fn video(&self) -> &VideoStream {
        &self.video
    }

    /// Next packet of the video stream, `None` at end of input.
    pub fn read_video_packet(&mut self) -> Option<Packet> {
        let index = self.video.index();
        for (stream, packet) in self.inner.packets() {
            if stream.index() == index {
                return Some(packet);
            }
        }
        None
    }

    pub fn seek_to_start(&mut self) -> anyhow::Result<()> {
        self.inner
            .seek(0, ..)
            .map_err(|e| anyhow::anyhow!("seek to start: {}", e))
    }
}
