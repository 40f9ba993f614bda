use serde::Serialize;
use shared::{
    domain::{PrinterState, TemperatureReading},
    error::Problem,
};

/// What the combined print/pause button should do in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintAction {
    Print,
    Pause,
    Resume,
}

/// Presentation affordances, derived from the session state alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlAvailability {
    pub controls_enabled: bool,
    pub disconnect_enabled: bool,
    pub progress_visible: bool,
    pub print_action: PrintAction,
}

impl ControlAvailability {
    pub fn for_state(state: PrinterState) -> Self {
        use PrinterState::*;

        Self {
            controls_enabled: !matches!(state, Disconnected | Connecting),
            // Stays off from BUSY until the printer is back to IDLE.
            disconnect_enabled: !matches!(
                state,
                Disconnected | Busy | Pause | Stop | FinishedPrint
            ),
            progress_visible: matches!(state, StartPrint | Busy | Pause),
            print_action: match state {
                StartPrint | Busy => PrintAction::Pause,
                Pause => PrintAction::Resume,
                _ => PrintAction::Print,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    /// Controller-originated entries ("Serial connected", pushed commands).
    Session,
    Received,
    Sent,
}

/// Notification pushed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    StateChanged { state: PrinterState, label: String },
    Controls(ControlAvailability),
    Telemetry(TemperatureReading),
    LogLine { source: LogSource, text: String },
    PortsChanged(Vec<String>),
    Progress(f32),
    ExtruderCountChanged(u32),
    Problem(Problem),
}
