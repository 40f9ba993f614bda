use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection / print life-cycle of one printer session.
///
/// Values only ever change in response to a state report from the device
/// link; intents never assign a state directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterState {
    #[default]
    Disconnected,
    Connecting,
    Idle,
    StartPrint,
    Busy,
    Pause,
    Stop,
    FinishedPrint,
    ErrorState,
}

impl PrinterState {
    pub const ALL: [PrinterState; 9] = [
        PrinterState::Disconnected,
        PrinterState::Connecting,
        PrinterState::Idle,
        PrinterState::StartPrint,
        PrinterState::Busy,
        PrinterState::Pause,
        PrinterState::Stop,
        PrinterState::FinishedPrint,
        PrinterState::ErrorState,
    ];

    pub fn is_connected(self) -> bool {
        self != PrinterState::Disconnected
    }

    /// States in which a print stream exists on the link.
    pub fn is_printing(self) -> bool {
        matches!(
            self,
            PrinterState::StartPrint | PrinterState::Busy | PrinterState::Pause
        )
    }

    /// Human-readable label shown by the presentation layer.
    pub fn label(self) -> &'static str {
        match self {
            PrinterState::Disconnected => "Not Connected",
            PrinterState::Connecting => "Connecting...",
            PrinterState::Idle => "Connected",
            PrinterState::StartPrint => "Starting Print",
            PrinterState::Busy => "Printing",
            PrinterState::Pause => "Paused",
            PrinterState::Stop => "Stopping Print",
            PrinterState::FinishedPrint => "Finished Print",
            PrinterState::ErrorState => "Error",
        }
    }
}

impl fmt::Display for PrinterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrinterState::Disconnected => "DISCONNECTED",
            PrinterState::Connecting => "CONNECTING",
            PrinterState::Idle => "IDLE",
            PrinterState::StartPrint => "STARTPRINT",
            PrinterState::Busy => "BUSY",
            PrinterState::Pause => "PAUSE",
            PrinterState::Stop => "STOP",
            PrinterState::FinishedPrint => "FINISHEDPRINT",
            PrinterState::ErrorState => "ERRORSTATE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    E,
}

impl Axis {
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::E => 'E',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown axis '{0}'")]
pub struct UnknownAxis(pub String);

impl FromStr for Axis {
    type Err = UnknownAxis;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "X" => Ok(Axis::X),
            "Y" => Ok(Axis::Y),
            "Z" => Ok(Axis::Z),
            "E" => Ok(Axis::E),
            _ => Err(UnknownAxis(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureKind {
    Actual,
    Target,
}

/// Heater a temperature sample belongs to. Extruders are zero-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureChannel {
    Bed,
    Extruder(u32),
}

impl TemperatureChannel {
    pub fn index(self) -> u32 {
        match self {
            TemperatureChannel::Bed => 0,
            TemperatureChannel::Extruder(index) => index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub channel: TemperatureChannel,
    pub kind: TemperatureKind,
    pub value: f32,
}

impl TemperatureReading {
    /// Decodes the 2-bit sensor category used on the device link:
    /// bit 1 selects extruder over bed, bit 0 selects target over actual.
    /// Codes above 3 (enclosure sensors and the like) are not tracked.
    pub fn from_category(code: u8, index: u32, value: f32) -> Option<Self> {
        if code > 0b11 {
            return None;
        }
        let channel = if code & 0b10 == 0 {
            TemperatureChannel::Bed
        } else {
            TemperatureChannel::Extruder(index)
        };
        let kind = if code & 0b01 == 0 {
            TemperatureKind::Actual
        } else {
            TemperatureKind::Target
        };
        Some(Self {
            channel,
            kind,
            value,
        })
    }

    pub fn category_code(&self) -> u8 {
        let extruder = matches!(self.channel, TemperatureChannel::Extruder(_)) as u8;
        let target = (self.kind == TemperatureKind::Target) as u8;
        (extruder << 1) | target
    }

    /// Name of the history series this reading is appended to.
    pub fn series_name(&self) -> String {
        let kind = match self.kind {
            TemperatureKind::Actual => "Actual",
            TemperatureKind::Target => "Target",
        };
        match self.channel {
            TemperatureChannel::Bed => format!("{kind} Bed"),
            TemperatureChannel::Extruder(index) => format!("{kind} Ext.{}", index + 1),
        }
    }

    pub fn log_text(&self) -> String {
        let label = match (self.channel, self.kind) {
            (TemperatureChannel::Bed, TemperatureKind::Actual) => "Bed Temperature",
            (TemperatureChannel::Bed, TemperatureKind::Target) => "Bed Target Temperature",
            (TemperatureChannel::Extruder(_), TemperatureKind::Actual) => "Extruder Temperature",
            (TemperatureChannel::Extruder(_), TemperatureKind::Target) => {
                "Extruder Target Temperature"
            }
        };
        format!("{label} [{}] : {}", self.channel.index(), self.value)
    }
}
