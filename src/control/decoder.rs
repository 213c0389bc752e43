use std::{str::FromStr, sync::Arc};

use serde::Deserialize;

use crate::control::{ControlState, ViewportChange};

/// Fixed horizontal step of `pan_left` / `pan_right`, pixels.
pub const PAN_STEP: i64 = 20;
/// `zoom_*` values are divided by this to get the zoom level.
pub const ZOOM_DIVISOR: f64 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
    TiltUp,
    TiltDown,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zoom_in" => Ok(Command::ZoomIn),
            "zoom_out" => Ok(Command::ZoomOut),
            "pan_left" => Ok(Command::PanLeft),
            "pan_right" => Ok(Command::PanRight),
            "tilt_up" => Ok(Command::TiltUp),
            "tilt_down" => Ok(Command::TiltDown),
            _ => Err(anyhow::anyhow!("unknown command: {}", s)),
        }
    }
}

impl Command {
    /// Maps the command and its magnitude to a state change.
    ///
    /// Both zoom directions set the same absolute level `value / 50`; the
    /// direction of the command does not matter.
    pub fn to_change(self, value: Option<f64>) -> anyhow::Result<ViewportChange> {
        let change = match self {
            Command::ZoomIn | Command::ZoomOut => {
                ViewportChange::Zoom(required(self, value)? / ZOOM_DIVISOR)
            }
            Command::PanLeft => ViewportChange::Pan(-PAN_STEP),
            Command::PanRight => ViewportChange::Pan(PAN_STEP),
            Command::TiltUp => ViewportChange::Tilt(-(required(self, value)? as i64)),
            Command::TiltDown => ViewportChange::Tilt(required(self, value)? as i64),
        };
        Ok(change)
    }
}

fn required(command: Command, value: Option<f64>) -> anyhow::Result<f64> {
    let value = value.ok_or_else(|| anyhow::anyhow!("{:?} requires a value", command))?;
    if !value.is_finite() {
        anyhow::bail!("{:?} value is not finite: {}", command, value);
    }
    Ok(value)
}

/// Wire format of a control message.
#[derive(Debug, Deserialize)]
pub struct ControlMessage {
    pub command: String,
    pub id: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Applies control messages addressed to one camera identity.
pub struct ControlDecoder {
    camera_id: String,
    state: Arc<ControlState>,
}

impl ControlDecoder {
    pub fn new(camera_id: impl Into<String>, state: Arc<ControlState>) -> Self {
        Self {
            camera_id: camera_id.into(),
            state,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn state(&self) -> &Arc<ControlState> {
        &self.state
    }

    /// Parses one raw payload and applies it. Malformed payloads are logged
    /// and dropped.
    pub fn handle_payload(&self, payload: &[u8]) {
        match serde_json::from_slice::<ControlMessage>(payload) {
            Ok(message) => self.update(&message.command, &message.id, message.value),
            Err(e) => {
                log::warn!(
                    "control: dropping malformed payload {:?}: {}",
                    String::from_utf8_lossy(payload),
                    e
                );
            }
        }
    }

    /// Never fails: commands for other cameras, unknown commands and invalid
    /// values leave the state untouched.
    pub fn update(&self, command: &str, id: &str, value: Option<f64>) {
        if id != self.camera_id {
            log::debug!("control: ignoring {} for camera {}", command, id);
            return;
        }

        let command = match command.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                log::debug!("control: {}", e);
                return;
            }
        };

        match command.to_change(value) {
            Ok(change) => {
                self.state.apply(change);
                log::info!(
                    "control: {:?} -> {:?}",
                    command,
                    self.state().snapshot()
                );
            }
            Err(e) => log::warn!("control: dropping command: {:#}", e),
        }
    }
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod decoder_test;
