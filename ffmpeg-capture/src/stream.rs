use ffmpeg_next::{codec::Parameters, format::stream::Stream, media::Type};

/// What the capture needs to know about the selected video stream.
pub struct VideoStream {
    index: usize,
    parameters: Parameters,
    fps: f64,
    frames: i64,
}

unsafe impl Send for VideoStream {}

impl VideoStream {
    /// `None` for audio, subtitle and data streams.
    pub fn probe(stream: &Stream<'_>) -> Option<Self> {
        let parameters = stream.parameters();
        if parameters.medium() != Type::Video {
            return None;
        }
        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() == 0 {
            0.0
        } else {
            f64::from(rate)
        };
        Some(Self {
            index: stream.index(),
            parameters,
            fps,
            frames: stream.frames(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Frames advertised by the container. Live devices report none.
    pub fn frame_count(&self) -> Option<u64> {
        (self.frames > 0).then_some(self.frames as u64)
    }
}
