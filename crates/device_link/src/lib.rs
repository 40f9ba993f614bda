use std::{path::Path, time::Duration};

use async_trait::async_trait;
use shared::domain::PrinterState;
use tokio::sync::broadcast;

pub mod simulated;

pub use simulated::{SimulatedPrinter, SimulatedPrinterOptions};

/// Event pushed by the device link. Events of one link are delivered in the
/// order the link produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    StateChanged(PrinterState),
    /// `sensor` is the raw 2-bit category code, `index` the heater number.
    TemperatureSample {
        sensor: u8,
        index: u32,
        value: f32,
    },
    LineReceived(Vec<u8>),
    LineSent(Vec<u8>),
    PrintProgress(f32),
    PortListChanged(Vec<String>),
    ExtruderCountKnown(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceEventKind {
    StateChanged,
    Temperature,
    LineReceived,
    LineSent,
    Progress,
    PortList,
    ExtruderCount,
}

impl DeviceEvent {
    pub fn kind(&self) -> DeviceEventKind {
        match self {
            DeviceEvent::StateChanged(_) => DeviceEventKind::StateChanged,
            DeviceEvent::TemperatureSample { .. } => DeviceEventKind::Temperature,
            DeviceEvent::LineReceived(_) => DeviceEventKind::LineReceived,
            DeviceEvent::LineSent(_) => DeviceEventKind::LineSent,
            DeviceEvent::PrintProgress(_) => DeviceEventKind::Progress,
            DeviceEvent::PortListChanged(_) => DeviceEventKind::PortList,
            DeviceEvent::ExtruderCountKnown(_) => DeviceEventKind::ExtruderCount,
        }
    }
}

/// Serial/firmware link to one printer.
///
/// Every method only submits work: results arrive later through
/// [`DeviceLink::subscribe_events`].
#[async_trait]
pub trait DeviceLink: Send + Sync {
    async fn open(&self, port: &str, baud: u32) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
    async fn send_command(&self, command: &str) -> anyhow::Result<()>;
    async fn load_firmware_profile(&self, name: &str) -> anyhow::Result<()>;
    async fn start_print(&self, file: &Path) -> anyhow::Result<()>;
    async fn pause_print(&self, post_pause: &str) -> anyhow::Result<()>;
    async fn resume_print(&self) -> anyhow::Result<()>;
    async fn stop_print(&self) -> anyhow::Result<()>;
    fn set_poll_interval(&self, interval: Duration);
    fn extruder_count(&self) -> u32;
    fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent>;
}
