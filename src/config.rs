use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::media::types::VideoSource;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "WebSocket video streamer with MQTT-controlled zoom, pan and tilt"
)]
pub struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = 8765)]
    port: u16,

    /// Target frames per second
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
    fps: u32,

    /// JPEG quality 1-100
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Downscale width for performance (px), 0 keeps the cropped size
    #[arg(long, default_value_t = 1280)]
    max_width: u32,

    /// Path to a video file, looped when it ends
    #[arg(long, default_value = "sample360.mp4")]
    video: PathBuf,

    /// Capture device index, e.g. 0 for the default camera
    #[arg(long, conflicts_with = "pattern")]
    camera: Option<u32>,

    /// Built-in moving test pattern instead of a file, e.g. 640x360
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pattern: Option<(u32, u32)>,

    /// Frames per test pattern loop, 0 streams forever like a live device
    #[arg(long, default_value_t = 300)]
    pattern_frames: u64,

    /// Give up opening the video source after this many milliseconds
    #[arg(long)]
    open_timeout_ms: Option<u64>,

    #[arg(long, default_value = "localhost")]
    broker_host: String,

    #[arg(long, default_value_t = 8083)]
    broker_port: u16,

    #[arg(long, value_enum, default_value_t = BrokerTransport::Ws)]
    broker_transport: BrokerTransport,

    /// Control topic
    #[arg(long, default_value = "forklift/control")]
    topic: String,

    /// Only control messages with this `id` are applied
    #[arg(long, default_value = "local_camera_right")]
    camera_id: String,

    /// Do not connect to the control broker
    #[arg(long, default_value_t = false)]
    no_control: bool,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", value))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("width: {}", e))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("height: {}", e))?;
    if w == 0 || h == 0 {
        return Err("width and height must be positive".to_string());
    }
    Ok((w, h))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BrokerTransport {
    Tcp,
    Ws,
}

/// Per-session streaming parameters.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    video: VideoSource,
    fps: u32,
    quality: u8,
    max_width: Option<u32>,
    open_timeout: Option<Duration>,
}

impl StreamConfig {
    pub fn new(video: VideoSource, fps: u32, quality: u8, max_width: Option<u32>) -> Self {
        Self {
            video,
            fps: fps.max(1),
            quality: quality.clamp(1, 100),
            max_width: max_width.filter(|w| *w > 0),
            open_timeout: None,
        }
    }

    pub fn with_open_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn video(&self) -> &VideoSource {
        &self.video
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps as f64)
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn max_width(&self) -> Option<u32> {
        self.max_width
    }

    pub fn open_timeout(&self) -> Option<Duration> {
        self.open_timeout
    }
}

#[derive(Clone, Debug)]
pub struct ControlChannelConfig {
    host: String,
    port: u16,
    transport: BrokerTransport,
    topic: String,
    camera_id: String,
}

impl ControlChannelConfig {
    pub fn new(
        host: &str,
        port: u16,
        transport: BrokerTransport,
        topic: &str,
        camera_id: &str,
    ) -> Self {
        Self {
            host: host.to_string(),
            port,
            transport,
            topic: topic.to_string(),
            camera_id: camera_id.to_string(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport(&self) -> BrokerTransport {
        self.transport
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }
}

pub struct AppConfig {
    listen: String,
    stream: StreamConfig,
    control: Option<ControlChannelConfig>,
}

impl AppConfig {
    pub fn from_args(args: Args) -> Self {
        let video = if let Some(index) = args.camera {
            VideoSource::Device(index)
        } else if let Some((width, height)) = args.pattern {
            VideoSource::Pattern {
                width,
                height,
                frames: args.pattern_frames,
            }
        } else {
            VideoSource::File(args.video)
        };

        let stream = StreamConfig::new(video, args.fps, args.quality, Some(args.max_width))
            .with_open_timeout(args.open_timeout_ms.map(Duration::from_millis));

        let control = (!args.no_control).then(|| {
            ControlChannelConfig::new(
                &args.broker_host,
                args.broker_port,
                args.broker_transport,
                &args.topic,
                &args.camera_id,
            )
        });

        Self {
            listen: format!("{}:{}", args.host, args.port),
            stream,
            control,
        }
    }

    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    pub fn control(&self) -> Option<&ControlChannelConfig> {
        self.control.as_ref()
    }
}
