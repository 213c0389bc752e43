use base64::{Engine as _, engine::general_purpose};
use jpeg_encoder::{ColorType, Encoder};

use crate::media::types::Frame;

/// Content-type marker the viewer renders directly as an image source.
pub const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Compresses an RGB frame to baseline JPEG. `quality` is 1-100.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> anyhow::Result<Vec<u8>> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        anyhow::bail!("cannot encode empty {}x{} frame", width, height);
    }
    let w = u16::try_from(width).map_err(|_| anyhow::anyhow!("frame too wide: {}", width))?;
    let h = u16::try_from(height).map_err(|_| anyhow::anyhow!("frame too tall: {}", height))?;

    let mut jpeg = Vec::with_capacity(frame.as_raw().len() / 8);
    let encoder = Encoder::new(&mut jpeg, quality.clamp(1, 100));
    encoder.encode(frame.as_raw(), w, h, ColorType::Rgb)?;
    Ok(jpeg)
}

pub fn to_data_url(jpeg: &[u8]) -> String {
    let mut url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len().div_ceil(3) * 4);
    url.push_str(DATA_URL_PREFIX);
    general_purpose::STANDARD.encode_string(jpeg, &mut url);
    url
}

/// Frame to the text message sent to viewers.
pub fn encode_frame(frame: &Frame, quality: u8) -> anyhow::Result<String> {
    encode_jpeg(frame, quality).map(|jpeg| to_data_url(&jpeg))
}
