/// Tightly packed RGB24 image, row stride `width * 3`.
#[derive(Clone, Debug, Default)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbFrame {
    /// Copies plane 0 of an RGB24 frame, dropping FFmpeg's line padding.
    pub fn from_video(frame: &ffmpeg_next::frame::Video) -> Self {
        let width = frame.width();
        let height = frame.height();
        let row = width as usize * 3;
        let stride = frame.stride(0);
        let plane = frame.data(0);

        let mut data = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            data.extend_from_slice(&plane[start..start + row]);
        }

        Self {
            width,
            height,
            data,
        }
    }
}
