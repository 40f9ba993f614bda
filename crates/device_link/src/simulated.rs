//! In-process printer that answers the [`DeviceLink`] contract without any
//! serial hardware. Used by the desktop app for dry runs and by tests.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::bail;
use async_trait::async_trait;
use shared::domain::PrinterState;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info};

use crate::{DeviceEvent, DeviceLink};

const AMBIENT_CELSIUS: f32 = 21.0;
const HEATER_APPROACH: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct SimulatedPrinterOptions {
    pub extruders: u32,
    pub ports: Vec<String>,
    pub progress_step: f32,
    pub progress_tick: Duration,
}

impl Default for SimulatedPrinterOptions {
    fn default() -> Self {
        Self {
            extruders: 1,
            ports: vec!["/dev/ttyUSB0".to_string()],
            progress_step: 5.0,
            progress_tick: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Heater {
    actual: f32,
    target: f32,
}

impl Heater {
    fn ambient() -> Self {
        Self {
            actual: AMBIENT_CELSIUS,
            target: 0.0,
        }
    }

    fn step(&mut self) {
        let goal = if self.target > 0.0 {
            self.target
        } else {
            AMBIENT_CELSIUS
        };
        self.actual += (goal - self.actual) * HEATER_APPROACH;
    }
}

struct SimState {
    state: PrinterState,
    port: Option<String>,
    firmware: Option<String>,
    poll_interval: Duration,
    bed: Heater,
    extruders: Vec<Heater>,
    progress: f32,
    print_task: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
}

impl SimState {
    fn abort_tasks(&mut self) {
        if let Some(task) = self.print_task.take() {
            task.abort();
        }
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    fn sample_heaters(&mut self) -> Vec<DeviceEvent> {
        self.bed.step();
        let mut samples = vec![
            DeviceEvent::TemperatureSample {
                sensor: 0,
                index: 0,
                value: self.bed.actual,
            },
            DeviceEvent::TemperatureSample {
                sensor: 1,
                index: 0,
                value: self.bed.target,
            },
        ];
        for (index, heater) in self.extruders.iter_mut().enumerate() {
            heater.step();
            samples.push(DeviceEvent::TemperatureSample {
                sensor: 2,
                index: index as u32,
                value: heater.actual,
            });
            samples.push(DeviceEvent::TemperatureSample {
                sensor: 3,
                index: index as u32,
                value: heater.target,
            });
        }
        samples
    }

    fn apply_command(&mut self, command: &str) {
        let mut words = command.split_whitespace();
        let code = words.next();
        let value = words
            .find_map(|word| word.strip_prefix('S'))
            .and_then(|value| value.parse::<f32>().ok());
        match (code, value) {
            (Some("M140"), Some(celsius)) => self.bed.target = celsius,
            (Some("M104"), Some(celsius)) => {
                if let Some(heater) = self.extruders.first_mut() {
                    heater.target = celsius;
                }
            }
            _ => {}
        }
    }
}

struct Shared {
    state: Mutex<SimState>,
    events: broadcast::Sender<DeviceEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DeviceEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, sim: &mut SimState, next: PrinterState) {
        sim.state = next;
        self.emit(DeviceEvent::StateChanged(next));
    }
}

pub struct SimulatedPrinter {
    options: SimulatedPrinterOptions,
    shared: Arc<Shared>,
}

impl SimulatedPrinter {
    pub fn new(options: SimulatedPrinterOptions) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            options,
            shared: Arc::new(Shared {
                state: Mutex::new(SimState {
                    state: PrinterState::Disconnected,
                    port: None,
                    firmware: None,
                    poll_interval: Duration::from_secs(1),
                    bed: Heater::ambient(),
                    extruders: Vec::new(),
                    progress: 0.0,
                    print_task: None,
                    poll_task: None,
                }),
                events,
            }),
        }
    }

    pub fn announce_ports(&self) {
        self.shared
            .emit(DeviceEvent::PortListChanged(self.options.ports.clone()));
    }

    pub fn firmware(&self) -> Option<String> {
        self.shared.lock().firmware.clone()
    }

    /// Reports a printer fault, as a thermal runaway or endstop error would.
    pub fn inject_fault(&self) {
        let mut sim = self.shared.lock();
        if let Some(task) = sim.print_task.take() {
            task.abort();
        }
        self.shared.set_state(&mut sim, PrinterState::ErrorState);
    }

    /// Drops the link without a close request, like a pulled USB cable.
    pub fn drop_connection(&self) {
        let mut sim = self.shared.lock();
        sim.abort_tasks();
        sim.port = None;
        if sim.state.is_connected() {
            self.shared.set_state(&mut sim, PrinterState::Disconnected);
        }
    }

    fn spawn_poll_task(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            loop {
                let interval = shared.lock().poll_interval;
                tokio::time::sleep(interval).await;
                let samples = {
                    let mut sim = shared.lock();
                    if !sim.state.is_connected() {
                        break;
                    }
                    sim.sample_heaters()
                };
                for sample in samples {
                    shared.emit(sample);
                }
            }
        })
    }

    fn spawn_print_task(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let step = self.options.progress_step;
        let tick = self.options.progress_tick;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let mut sim = shared.lock();
                match sim.state {
                    PrinterState::Pause => continue,
                    PrinterState::Busy => {}
                    _ => break,
                }
                sim.progress = (sim.progress + step).min(100.0);
                let progress = sim.progress;
                shared.emit(DeviceEvent::PrintProgress(progress));
                if progress >= 100.0 {
                    shared.set_state(&mut sim, PrinterState::FinishedPrint);
                    shared.set_state(&mut sim, PrinterState::Idle);
                    sim.print_task = None;
                    break;
                }
            }
        })
    }
}

#[async_trait]
impl DeviceLink for SimulatedPrinter {
    async fn open(&self, port: &str, baud: u32) -> anyhow::Result<()> {
        {
            let mut sim = self.shared.lock();
            if sim.state.is_connected() {
                bail!(
                    "simulated printer already open on {}",
                    sim.port.as_deref().unwrap_or("<unknown>")
                );
            }
            info!(port, baud, "simulated link: opening");
            sim.port = Some(port.to_string());
            sim.bed = Heater::ambient();
            sim.extruders = vec![Heater::ambient(); self.options.extruders as usize];
            self.shared.set_state(&mut sim, PrinterState::Connecting);
            self.shared
                .emit(DeviceEvent::ExtruderCountKnown(self.options.extruders));
            self.shared.set_state(&mut sim, PrinterState::Idle);
        }
        let task = self.spawn_poll_task();
        self.shared.lock().poll_task = Some(task);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let mut sim = self.shared.lock();
        sim.abort_tasks();
        sim.port = None;
        if sim.state.is_connected() {
            self.shared.set_state(&mut sim, PrinterState::Disconnected);
        }
        Ok(())
    }

    async fn send_command(&self, command: &str) -> anyhow::Result<()> {
        let mut sim = self.shared.lock();
        if !sim.state.is_connected() {
            bail!("simulated printer is not open");
        }
        self.shared
            .emit(DeviceEvent::LineSent(format!("{command}\n").into_bytes()));
        sim.apply_command(command);
        self.shared.emit(DeviceEvent::LineReceived(b"ok\n".to_vec()));
        Ok(())
    }

    async fn load_firmware_profile(&self, name: &str) -> anyhow::Result<()> {
        debug!(firmware = name, "simulated link: firmware profile selected");
        self.shared.lock().firmware = Some(name.to_string());
        Ok(())
    }

    async fn start_print(&self, file: &Path) -> anyhow::Result<()> {
        {
            let mut sim = self.shared.lock();
            if sim.state != PrinterState::Idle {
                bail!("cannot start a print while {}", sim.state);
            }
            info!(file = %file.display(), "simulated link: print stream started");
            sim.progress = 0.0;
            self.shared.set_state(&mut sim, PrinterState::StartPrint);
            self.shared.set_state(&mut sim, PrinterState::Busy);
        }
        let task = self.spawn_print_task();
        self.shared.lock().print_task = Some(task);
        Ok(())
    }

    async fn pause_print(&self, post_pause: &str) -> anyhow::Result<()> {
        let mut sim = self.shared.lock();
        if sim.state != PrinterState::Busy {
            bail!("cannot pause while {}", sim.state);
        }
        self.shared.set_state(&mut sim, PrinterState::Pause);
        if !post_pause.is_empty() {
            self.shared
                .emit(DeviceEvent::LineSent(format!("{post_pause}\n").into_bytes()));
        }
        Ok(())
    }

    async fn resume_print(&self) -> anyhow::Result<()> {
        let mut sim = self.shared.lock();
        if sim.state != PrinterState::Pause {
            bail!("cannot resume while {}", sim.state);
        }
        self.shared.set_state(&mut sim, PrinterState::Busy);
        Ok(())
    }

    async fn stop_print(&self) -> anyhow::Result<()> {
        let mut sim = self.shared.lock();
        if !sim.state.is_printing() {
            bail!("no print to stop while {}", sim.state);
        }
        if let Some(task) = sim.print_task.take() {
            task.abort();
        }
        self.shared.set_state(&mut sim, PrinterState::Stop);
        self.shared.set_state(&mut sim, PrinterState::Idle);
        Ok(())
    }

    fn set_poll_interval(&self, interval: Duration) {
        self.shared.lock().poll_interval = interval;
    }

    fn extruder_count(&self) -> u32 {
        self.options.extruders
    }

    fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }
}
