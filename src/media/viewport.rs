use image::imageops::{self, FilterType};

use crate::{control::Viewport, media::types::Frame};

/// Sampled rectangle of a frame, in source pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Region of a `width` x `height` frame selected by `viewport`.
///
/// The region is `1/zoom` of the frame, centered on the frame center moved by
/// pan/tilt, with its origin clamped to the frame and its far edge cut at the
/// border. Extreme offsets give an empty region.
pub fn crop_region(width: u32, height: u32, viewport: &Viewport) -> Region {
    let (x, span_x) = axis(width, viewport.zoom, viewport.pan);
    let (y, span_y) = axis(height, viewport.zoom, viewport.tilt);
    Region {
        x,
        y,
        width: span_x,
        height: span_y,
    }
}

fn axis(size: u32, zoom: f64, offset: i64) -> (u32, u32) {
    let size = size as i64;
    let sampled = (size as f64 / zoom) as i64;
    let start = (size / 2 - sampled / 2).saturating_add(offset).max(0);
    let end = start.saturating_add(sampled).min(size);
    let span = (end - start).max(0);
    (start.min(size) as u32, span as u32)
}

/// Crop-and-downscale step applied to every frame before encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct ViewportTransform {
    max_width: Option<u32>,
}

impl ViewportTransform {
    pub fn new(max_width: Option<u32>) -> Self {
        Self {
            max_width: max_width.filter(|w| *w > 0),
        }
    }

    /// `None` when the viewport selects nothing; the frame is skipped.
    pub fn apply(&self, frame: Frame, viewport: &Viewport) -> Option<Frame> {
        let region = crop_region(frame.width(), frame.height(), viewport);
        if region.is_empty() {
            return None;
        }

        let cropped = if (region.width, region.height) == frame.dimensions() {
            frame
        } else {
            imageops::crop_imm(&frame, region.x, region.y, region.width, region.height).to_image()
        };
        self.downscale(cropped)
    }

    fn downscale(&self, frame: Frame) -> Option<Frame> {
        let Some(max_width) = self.max_width else {
            return Some(frame);
        };
        let (width, height) = frame.dimensions();
        if width <= max_width {
            return Some(frame);
        }

        let new_height = (height as f64 * (max_width as f64 / width as f64)) as u32;
        if new_height == 0 {
            return None;
        }
        Some(imageops::resize(
            &frame,
            max_width,
            new_height,
            FilterType::Triangle,
        ))
    }
}
