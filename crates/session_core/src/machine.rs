//! Pure session state machine: device events in, effects out.
//!
//! Nothing here touches the device link. [`crate::SessionController`] owns a
//! [`SessionMachine`] and carries out the [`Effect`]s it returns.

use device_link::DeviceEvent;
use shared::{
    domain::{PrinterState, TemperatureChannel, TemperatureReading},
    error::{ErrorCode, Problem},
};
use tracing::{debug, info, warn};

use crate::{
    error::SessionError,
    routing,
    session::{ConnectionParams, PollRate, Session},
    types::{ControlAvailability, LogSource, Notification},
};

const LINK_LOST_LABEL: &str = "Connection lost";

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Notify(Notification),
    SetPollInterval(PollRate),
    /// Ask the link for its extruder count and feed it back through
    /// [`SessionMachine::set_extruder_count`].
    RefreshExtruderCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Parameters recorded; the link should be opened.
    Opening,
    /// The same profile and port are already connected and idle.
    AlreadyConnected,
}

/// Transitions the device may report, besides the handshake start
/// (DISCONNECTED → CONNECTING) which additionally needs a pending connect.
pub fn is_allowed_transition(from: PrinterState, to: PrinterState) -> bool {
    use PrinterState::*;

    match (from, to) {
        (Disconnected, _) => false,
        (_, Disconnected) | (_, ErrorState) => true,
        (Connecting, Idle) => true,
        (Idle, StartPrint) => true,
        (StartPrint, Busy) => true,
        (Busy, Pause) | (Pause, Busy) => true,
        (StartPrint | Busy, FinishedPrint) => true,
        (StartPrint | Busy | Pause, Stop) => true,
        (Stop | FinishedPrint, Idle) => true,
        _ => false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    session: Session,
    /// Parameters of a connect intent awaiting the CONNECTING report.
    pending: Option<ConnectionParams>,
    disconnect_requested: bool,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PrinterState {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    #[cfg(test)]
    pub fn has_pending_connect(&self) -> bool {
        self.pending.is_some()
    }

    pub fn begin_connect(
        &mut self,
        params: ConnectionParams,
    ) -> Result<ConnectOutcome, SessionError> {
        let state = self.session.state;
        if state == PrinterState::Idle {
            let same_target = self.session.connection.as_ref().is_some_and(|current| {
                current.profile_name == params.profile_name && current.port == params.port
            });
            if same_target {
                return Ok(ConnectOutcome::AlreadyConnected);
            }
        }
        if state != PrinterState::Disconnected || self.pending.is_some() {
            let state = if self.pending.is_some() && state == PrinterState::Disconnected {
                PrinterState::Connecting
            } else {
                state
            };
            return Err(SessionError::SessionActive { state });
        }
        self.pending = Some(params);
        self.disconnect_requested = false;
        Ok(ConnectOutcome::Opening)
    }

    /// Forgets a connect intent whose link request failed.
    pub fn abort_connect(&mut self) {
        if self.session.state == PrinterState::Disconnected {
            self.pending = None;
        }
    }

    /// Marks the next DISCONNECTED report as the answer to an explicit
    /// disconnect rather than a lost link.
    pub fn note_disconnect_requested(&mut self) {
        self.pending = None;
        if self.session.state.is_connected() {
            self.disconnect_requested = true;
        }
    }

    /// Withdraws a disconnect intent whose close request failed, so a later
    /// drop of the link still counts as lost.
    pub fn abort_disconnect(&mut self) {
        self.disconnect_requested = false;
    }

    pub fn set_extruder_count(&mut self, count: u32) -> Vec<Effect> {
        if !self.session.state.is_connected() || self.session.extruder_count == count {
            return Vec::new();
        }
        self.session.extruder_count = count;
        vec![Effect::Notify(Notification::ExtruderCountChanged(count))]
    }

    pub fn apply(&mut self, event: DeviceEvent) -> Vec<Effect> {
        let state = self.session.state;
        let kind = event.kind();
        if !routing::routes(state, kind) {
            if routing::is_telemetry(kind) && !state.is_connected() {
                warn!(?kind, "dropping device event received while disconnected");
            } else {
                debug!(?kind, %state, "no subscriber for device event");
            }
            return Vec::new();
        }

        match event {
            DeviceEvent::StateChanged(next) => self.transition(next),
            DeviceEvent::TemperatureSample {
                sensor,
                index,
                value,
            } => self.temperature(sensor, index, value),
            DeviceEvent::LineReceived(bytes) => vec![log_line(
                LogSource::Received,
                routing::escape_line(&String::from_utf8_lossy(&bytes)),
            )],
            DeviceEvent::LineSent(bytes) => vec![log_line(
                LogSource::Sent,
                routing::escape_line(&String::from_utf8_lossy(&bytes)),
            )],
            DeviceEvent::PrintProgress(percent) => {
                if !percent.is_finite() {
                    warn!(percent, "dropping non-finite print progress");
                    return Vec::new();
                }
                vec![Effect::Notify(Notification::Progress(
                    percent.clamp(0.0, 100.0),
                ))]
            }
            DeviceEvent::PortListChanged(ports) => {
                vec![Effect::Notify(Notification::PortsChanged(ports))]
            }
            DeviceEvent::ExtruderCountKnown(count) => self.set_extruder_count(count),
        }
    }

    fn temperature(&self, sensor: u8, index: u32, value: f32) -> Vec<Effect> {
        let Some(reading) = TemperatureReading::from_category(sensor, index, value) else {
            warn!(sensor, index, "dropping temperature sample for unknown sensor");
            return Vec::new();
        };
        let known_channel = match reading.channel {
            TemperatureChannel::Bed => index == 0,
            TemperatureChannel::Extruder(extruder) => {
                extruder < self.session.extruder_count.max(1)
            }
        };
        if !known_channel {
            warn!(
                sensor,
                index,
                extruders = self.session.extruder_count,
                "dropping temperature sample for unknown channel"
            );
            return Vec::new();
        }
        if !value.is_finite() {
            warn!(sensor, index, "dropping non-finite temperature sample");
            return Vec::new();
        }
        vec![
            Effect::Notify(Notification::Telemetry(reading)),
            log_line(LogSource::Received, reading.log_text()),
        ]
    }

    fn transition(&mut self, next: PrinterState) -> Vec<Effect> {
        let current = self.session.state;
        if next == current {
            debug!(state = %current, "repeated state report ignored");
            return Vec::new();
        }
        let allowed = match (current, next) {
            (PrinterState::Disconnected, PrinterState::Connecting | PrinterState::ErrorState) => {
                self.pending.is_some()
            }
            _ => is_allowed_transition(current, next),
        };
        if !allowed {
            warn!(from = %current, to = %next, "dropping unexpected state report");
            return Vec::new();
        }

        info!(from = %current, to = %next, "printer state changed");
        self.session.state = next;
        let mut label = next.label().to_string();
        let mut side_effects = Vec::new();

        match next {
            PrinterState::Connecting => {
                self.session.connection = self.pending.take();
                side_effects.push(Effect::SetPollInterval(PollRate::Fast));
            }
            PrinterState::Idle => {
                if let Some(connection) = &self.session.connection {
                    label = format!("Connected to {}", connection.port);
                }
                if current == PrinterState::Connecting {
                    side_effects.push(Effect::RefreshExtruderCount);
                    side_effects.push(log_line(LogSource::Session, "Serial connected"));
                    side_effects.push(Effect::SetPollInterval(PollRate::Idle));
                }
            }
            PrinterState::Disconnected => {
                let requested = std::mem::take(&mut self.disconnect_requested);
                self.session.connection = None;
                self.session.extruder_count = 0;
                self.pending = None;
                side_effects.push(Effect::SetPollInterval(PollRate::Default));
                side_effects.push(log_line(LogSource::Session, "Serial disconnected"));
                if !requested {
                    label = LINK_LOST_LABEL.to_string();
                    side_effects.push(Effect::Notify(Notification::Problem(Problem::new(
                        ErrorCode::LinkLoss,
                        "connection to the printer was lost",
                    ))));
                }
            }
            PrinterState::ErrorState => {
                if current == PrinterState::Disconnected {
                    self.session.connection = self.pending.take();
                }
                side_effects.push(Effect::Notify(Notification::Problem(Problem::new(
                    ErrorCode::DeviceFault,
                    "printer reported a fault; disconnect and reconnect to recover",
                ))));
            }
            _ => {}
        }

        let mut effects = vec![
            Effect::Notify(Notification::StateChanged { state: next, label }),
            Effect::Notify(Notification::Controls(ControlAvailability::for_state(next))),
        ];
        effects.extend(side_effects);
        effects
    }
}

fn log_line(source: LogSource, text: impl Into<String>) -> Effect {
    Effect::Notify(Notification::LogLine {
        source,
        text: text.into(),
    })
}

#[cfg(test)]
#[path = "tests/machine_tests.rs"]
mod tests;
