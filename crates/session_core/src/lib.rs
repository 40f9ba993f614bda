use std::path::PathBuf;

use async_trait::async_trait;
use shared::domain::Axis;
use tokio::sync::broadcast;

pub mod connection;
mod controller;
pub mod error;
pub mod file_choice;
pub mod machine;
pub mod routing;
pub mod session;
pub mod types;

pub use controller::SessionController;
pub use error::SessionError;
pub use file_choice::{CancelFileChoice, FileChooser, FileSelection};
pub use machine::{ConnectOutcome, Effect, SessionMachine};
pub use session::{
    ConnectionParams, PollRate, Session, SessionSettings, SessionSnapshot, AUTO_DETECT_FIRMWARE,
    DEFAULT_BAUD,
};
pub use types::{ControlAvailability, LogSource, Notification, PrintAction};

/// Intent surface offered to the presentation layer.
///
/// Every intent returns as soon as it has been validated and handed to the
/// device link; the outcome arrives later as a [`Notification`].
#[async_trait]
pub trait SessionHandle: Send + Sync {
    async fn connect(&self, profile_name: &str, port: &str) -> Result<(), SessionError>;
    async fn disconnect(&self) -> Result<(), SessionError>;
    async fn print(&self) -> Result<(), SessionError>;
    async fn pause(&self) -> Result<(), SessionError>;
    async fn resume(&self) -> Result<(), SessionError>;
    async fn stop(&self) -> Result<(), SessionError>;
    async fn disable_motors(&self) -> Result<(), SessionError>;
    async fn jog_axis(&self, axis: Axis, distance: f64) -> Result<(), SessionError>;
    async fn set_bed_target(&self, celsius: u32) -> Result<(), SessionError>;
    async fn set_extruder_target(&self, celsius: u32) -> Result<(), SessionError>;
    async fn set_fan_speed(&self, percent: u8) -> Result<(), SessionError>;
    async fn set_flow_rate(&self, percent: u32) -> Result<(), SessionError>;
    async fn set_print_speed(&self, percent: u32) -> Result<(), SessionError>;
    async fn push_raw_command(&self, command: &str) -> Result<(), SessionError>;
    async fn set_open_files(&self, files: Vec<PathBuf>);
    async fn snapshot(&self) -> SessionSnapshot;
    fn profile_names(&self) -> Vec<String>;
    fn subscribe_notifications(&self) -> broadcast::Receiver<Notification>;
}

#[async_trait]
impl SessionHandle for SessionController {
    async fn connect(&self, profile_name: &str, port: &str) -> Result<(), SessionError> {
        SessionController::connect(self, profile_name, port).await
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        SessionController::disconnect(self).await
    }

    async fn print(&self) -> Result<(), SessionError> {
        SessionController::print(self).await
    }

    async fn pause(&self) -> Result<(), SessionError> {
        SessionController::pause(self).await
    }

    async fn resume(&self) -> Result<(), SessionError> {
        SessionController::resume(self).await
    }

    async fn stop(&self) -> Result<(), SessionError> {
        SessionController::stop(self).await
    }

    async fn disable_motors(&self) -> Result<(), SessionError> {
        SessionController::disable_motors(self).await
    }

    async fn jog_axis(&self, axis: Axis, distance: f64) -> Result<(), SessionError> {
        SessionController::jog_axis(self, axis, distance).await
    }

    async fn set_bed_target(&self, celsius: u32) -> Result<(), SessionError> {
        SessionController::set_bed_target(self, celsius).await
    }

    async fn set_extruder_target(&self, celsius: u32) -> Result<(), SessionError> {
        SessionController::set_extruder_target(self, celsius).await
    }

    async fn set_fan_speed(&self, percent: u8) -> Result<(), SessionError> {
        SessionController::set_fan_speed(self, percent).await
    }

    async fn set_flow_rate(&self, percent: u32) -> Result<(), SessionError> {
        SessionController::set_flow_rate(self, percent).await
    }

    async fn set_print_speed(&self, percent: u32) -> Result<(), SessionError> {
        SessionController::set_print_speed(self, percent).await
    }

    async fn push_raw_command(&self, command: &str) -> Result<(), SessionError> {
        SessionController::push_raw_command(self, command).await
    }

    async fn set_open_files(&self, files: Vec<PathBuf>) {
        SessionController::set_open_files(self, files).await
    }

    async fn snapshot(&self) -> SessionSnapshot {
        SessionController::snapshot(self).await
    }

    fn profile_names(&self) -> Vec<String> {
        SessionController::profile_names(self)
    }

    fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        SessionController::subscribe_notifications(self)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
