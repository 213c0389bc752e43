use ffmpeg_next::{
    format::Pixel,
    frame::Video,
    software::scaling::{Context, flag::Flags},
};

/// Converts decoded frames to packed RGB24 at their native size.
pub struct Scaler {
    context: Context,
    format: Pixel,
    width: u32,
    height: u32,
}

impl Scaler {
    pub fn rgb24(format: Pixel, width: u32, height: u32) -> anyhow::Result<Self> {
        let context = Context::get(
            format,
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            Flags::BILINEAR,
        )?;
        Ok(Self {
            context,
            format,
            width,
            height,
        })
    }

    pub fn accepts(&self, frame: &Video) -> bool {
        frame.format() == self.format && frame.width() == self.width && frame.height() == self.height
    }

    pub fn run(&mut self, frame: &Video) -> anyhow::Result<Video> {
        let mut dst = Video::empty();
        self.context.run(frame, &mut dst)?;
        Ok(dst)
    }
}

unsafe impl Send for Scaler {}
