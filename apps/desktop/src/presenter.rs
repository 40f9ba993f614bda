//! Turns session notifications into console output and keeps the little
//! view state the console needs: the last label, the control affordances,
//! temperature history and the optimistic print button label.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Local};
use serde::Serialize;
use session_core::{ControlAvailability, LogSource, Notification, PrintAction, SessionSnapshot};
use shared::domain::{PrinterState, TemperatureReading};

use crate::commands::BackendCommand;

const HISTORY_CAPACITY: usize = 600;

#[derive(Debug, Default)]
pub struct TemperatureHistory {
    series: BTreeMap<String, VecDeque<(DateTime<Local>, f32)>>,
}

impl TemperatureHistory {
    pub fn push(&mut self, reading: &TemperatureReading, at: DateTime<Local>) {
        let points = self.series.entry(reading.series_name()).or_default();
        if points.len() == HISTORY_CAPACITY {
            points.pop_front();
        }
        points.push_back((at, reading.value));
    }

    pub fn latest(&self, series: &str) -> Option<f32> {
        self.series
            .get(series)
            .and_then(|points| points.back())
            .map(|(_, value)| *value)
    }

    #[cfg(test)]
    pub fn len(&self, series: &str) -> usize {
        self.series.get(series).map_or(0, VecDeque::len)
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    at: DateTime<Local>,
    #[serde(flatten)]
    notification: &'a Notification,
}

pub struct Presenter {
    json: bool,
    state: PrinterState,
    label: String,
    controls: ControlAvailability,
    /// Button label shown before the printer confirms a pause or resume.
    predicted_action: Option<PrintAction>,
    progress: Option<f32>,
    ports: Vec<String>,
    history: TemperatureHistory,
}

impl Presenter {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            state: PrinterState::Disconnected,
            label: PrinterState::Disconnected.label().to_string(),
            controls: ControlAvailability::for_state(PrinterState::Disconnected),
            predicted_action: None,
            progress: None,
            ports: Vec::new(),
            history: TemperatureHistory::default(),
        }
    }

    #[cfg(test)]
    pub fn history(&self) -> &TemperatureHistory {
        &self.history
    }

    pub fn print_action(&self) -> PrintAction {
        self.predicted_action.unwrap_or(self.controls.print_action)
    }

    /// Flips the print button label as soon as a pause or resume is issued.
    /// The next state report replaces the guess with the real value.
    pub fn note_command(&mut self, command: &BackendCommand) {
        let predicted = match (command, self.print_action()) {
            (BackendCommand::Pause, PrintAction::Pause) => PrintAction::Resume,
            (BackendCommand::Pause | BackendCommand::Resume, PrintAction::Resume) => {
                PrintAction::Pause
            }
            _ => return,
        };
        self.predicted_action = Some(predicted);
    }

    pub fn render(&mut self, notification: &Notification) -> Option<String> {
        self.render_at(notification, Local::now())
    }

    pub fn render_at(
        &mut self,
        notification: &Notification,
        at: DateTime<Local>,
    ) -> Option<String> {
        let text = self.absorb(notification, at);
        if self.json {
            return serde_json::to_string(&JsonLine { at, notification }).ok();
        }
        text.map(|text| format!("[{}] {text}", at.format("%H:%M:%S")))
    }

    fn absorb(&mut self, notification: &Notification, at: DateTime<Local>) -> Option<String> {
        match notification {
            Notification::StateChanged { state, label } => {
                self.state = *state;
                self.label = label.clone();
                self.predicted_action = None;
                if *state == PrinterState::Disconnected {
                    self.history.clear();
                }
                Some(format!("state: {label} ({state})"))
            }
            Notification::Controls(controls) => {
                self.controls = *controls;
                self.predicted_action = None;
                if !controls.progress_visible {
                    self.progress = None;
                }
                None
            }
            Notification::Telemetry(reading) => {
                self.history.push(reading, at);
                None
            }
            Notification::LogLine { source, text } => {
                let marker = match source {
                    LogSource::Session => '*',
                    LogSource::Received => '<',
                    LogSource::Sent => '>',
                };
                Some(format!("{marker} {text}"))
            }
            Notification::PortsChanged(ports) => {
                self.ports = ports.clone();
                Some(format!("ports: {}", ports.join(", ")))
            }
            Notification::Progress(percent) => {
                self.progress = Some(*percent);
                Some(format!("progress: {percent:.1}%"))
            }
            Notification::ExtruderCountChanged(count) => Some(format!("extruders: {count}")),
            Notification::Problem(problem) => {
                let kind = if problem.is_fault() { "fault" } else { "problem" };
                Some(format!("{kind}: {}", problem.message))
            }
        }
    }

    pub fn status_line(&self) -> String {
        let mut line = format!(
            "{} [{}] button: {}",
            self.label,
            self.state,
            action_label(self.print_action())
        );
        if let Some(progress) = self.progress {
            line.push_str(&format!(" progress: {progress:.1}%"));
        }
        for series in ["Actual Bed", "Actual Ext.1"] {
            if let Some(value) = self.history.latest(series) {
                line.push_str(&format!(" {series}: {value:.1}"));
            }
        }
        line
    }

    pub fn render_snapshot(&self, snapshot: &SessionSnapshot) -> String {
        if self.json {
            return serde_json::to_string(snapshot).unwrap_or_default();
        }
        let connection = snapshot
            .connection
            .as_ref()
            .map(|c| format!("{} on {} @ {} ({})", c.profile_name, c.port, c.baud, c.firmware))
            .unwrap_or_else(|| "no connection".to_string());
        let files = snapshot
            .open_files
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{}\n  {connection}, extruders: {}\n  open files: {}\n  ports: {}",
            self.status_line(),
            snapshot.extruder_count,
            if files.is_empty() { "-" } else { &files },
            self.ports.join(", ")
        )
    }
}

pub fn action_label(action: PrintAction) -> &'static str {
    match action {
        PrintAction::Print => "Print",
        PrintAction::Pause => "Pause",
        PrintAction::Resume => "Resume",
    }
}
