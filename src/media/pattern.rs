use crate::media::{source::FrameSource, types::Frame};

/// SMPTE-like bar colours.
const BARS: [[u8; 3]; 8] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
    [16, 16, 16],
];

/// Colour bars scrolling one bar width every `BARS.len()` frames, similar to
/// lavfi `testsrc`. Needs no native libraries.
pub struct PatternSource {
    width: u32,
    height: u32,
    /// 0 = endless
    frames: u64,
    position: u64,
}

impl PatternSource {
    pub fn new(width: u32, height: u32, frames: u64) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("invalid pattern size {}x{}", width, height);
        }
        Ok(Self {
            width,
            height,
            frames,
            position: 0,
        })
    }

    fn render(&self, index: u64) -> Frame {
        let bar_width = (self.width as u64 / BARS.len() as u64).max(1);
        let shift = index * bar_width / BARS.len() as u64;
        // a bright marker line travelling down makes motion obvious
        let marker_y = (index % self.height as u64) as u32;

        Frame::from_fn(self.width, self.height, |x, y| {
            if y == marker_y {
                return image::Rgb([255, 255, 255]);
            }
            let bar = ((x as u64 + shift) / bar_width) as usize % BARS.len();
            image::Rgb(BARS[bar])
        })
    }
}

impl FrameSource for PatternSource {
    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        if self.frames > 0 && self.position >= self.frames {
            return Ok(None);
        }
        let frame = self.render(self.position);
        self.position += 1;
        Ok(Some(frame))
    }

    fn frame_count(&self) -> Option<u64> {
        (self.frames > 0).then_some(self.frames)
    }

    fn rewind(&mut self) -> anyhow::Result<()> {
        self.position = 0;
        Ok(())
    }
}
