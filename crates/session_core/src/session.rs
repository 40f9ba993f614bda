use std::{path::PathBuf, time::Duration};

use serde::Serialize;
use shared::domain::PrinterState;

use crate::types::ControlAvailability;

/// Firmware hint meaning "let the link detect the firmware itself".
pub const AUTO_DETECT_FIRMWARE: &str = "Auto-Detect";
pub const DEFAULT_BAUD: u32 = 115_200;

/// Parameters of one connection, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionParams {
    pub profile_name: String,
    pub port: String,
    pub baud: u32,
    pub firmware: String,
    /// Zero means the device default applies.
    pub bed_temp_max: u32,
    /// Zero means the device default applies.
    pub extruder_temp_max: u32,
    pub post_pause: String,
}

impl ConnectionParams {
    /// Firmware profile to load before opening the link, if one was chosen.
    pub fn explicit_firmware(&self) -> Option<&str> {
        (self.firmware != AUTO_DETECT_FIRMWARE).then_some(self.firmware.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub state: PrinterState,
    pub connection: Option<ConnectionParams>,
    pub extruder_count: u32,
}

impl Session {
    pub fn pending_post_pause(&self) -> Option<&str> {
        self.connection
            .as_ref()
            .map(|connection| connection.post_pause.as_str())
    }
}

/// Read-only view of a session handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: PrinterState,
    pub connection: Option<ConnectionParams>,
    pub extruder_count: u32,
    pub open_files: Vec<PathBuf>,
    pub controls: ControlAvailability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollRate {
    /// While the serial handshake runs.
    Fast,
    /// Once the printer is idle.
    Idle,
    /// With no printer attached.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub fast_poll: Duration,
    pub idle_poll: Duration,
    pub default_poll: Duration,
    pub notification_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            fast_poll: Duration::from_millis(200),
            idle_poll: Duration::from_millis(5000),
            default_poll: Duration::from_millis(1000),
            notification_capacity: 1024,
        }
    }
}

impl SessionSettings {
    pub fn poll_interval(&self, rate: PollRate) -> Duration {
        match rate {
            PollRate::Fast => self.fast_poll,
            PollRate::Idle => self.idle_poll,
            PollRate::Default => self.default_poll,
        }
    }
}
