use std::{collections::VecDeque, future::Future, path::PathBuf, sync::Arc};

use device_link::{DeviceEvent, DeviceLink};
use profile_store::ProfileStore;
use shared::{
    domain::{Axis, PrinterState},
    protocol::GCode,
};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        Mutex, RwLock,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    connection::assemble_connection_params,
    error::SessionError,
    file_choice::{resolve_print_file, FileChooser, FileSelection},
    machine::{ConnectOutcome, Effect, SessionMachine},
    session::{ConnectionParams, SessionSettings, SessionSnapshot},
    types::{ControlAvailability, LogSource, Notification},
};

/// Owns one printer session: validates intents against the current state,
/// forwards them to the device link, and turns link events into
/// notifications.
pub struct SessionController {
    link: Arc<dyn DeviceLink>,
    profiles: Arc<dyn ProfileStore>,
    chooser: Arc<dyn FileChooser>,
    settings: SessionSettings,
    machine: Mutex<SessionMachine>,
    open_files: RwLock<Vec<PathBuf>>,
    jog_queue: Mutex<()>,
    notifications: broadcast::Sender<Notification>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(
        link: Arc<dyn DeviceLink>,
        profiles: Arc<dyn ProfileStore>,
        chooser: Arc<dyn FileChooser>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(settings.notification_capacity.max(1));
        Arc::new(Self {
            link,
            profiles,
            chooser,
            settings,
            machine: Mutex::new(SessionMachine::new()),
            open_files: RwLock::new(Vec::new()),
            jog_queue: Mutex::new(()),
            notifications,
            event_task: Mutex::new(None),
        })
    }

    /// Subscribes to the device link and starts the event pump. Events are
    /// handled one at a time, in the order the link produced them.
    pub async fn start(self: &Arc<Self>) {
        let mut events = self.link.subscribe_events();
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => controller.handle_device_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "device events dropped before they could be handled");
                    }
                    Err(RecvError::Closed) => {
                        info!("device link event stream closed");
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.event_task.lock().await.replace(task) {
            previous.abort();
        }
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.event_task.lock().await.take() {
            task.abort();
        }
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.list_profile_names()
    }

    pub async fn state(&self) -> PrinterState {
        self.machine.lock().await.state()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let (state, connection, extruder_count) = {
            let machine = self.machine.lock().await;
            let session = machine.session();
            (
                session.state,
                session.connection.clone(),
                session.extruder_count,
            )
        };
        SessionSnapshot {
            state,
            connection,
            extruder_count,
            open_files: self.open_files.read().await.clone(),
            controls: ControlAvailability::for_state(state),
        }
    }

    pub async fn handle_device_event(&self, event: DeviceEvent) {
        let mut machine = self.machine.lock().await;
        let effects = machine.apply(event);
        self.run_effects(&mut machine, effects);
    }

    fn run_effects(&self, machine: &mut SessionMachine, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Notify(notification) => self.notify(notification),
                Effect::SetPollInterval(rate) => {
                    let interval = self.settings.poll_interval(rate);
                    debug!(?rate, ?interval, "telemetry poll interval changed");
                    self.link.set_poll_interval(interval);
                }
                Effect::RefreshExtruderCount => {
                    let count = self.link.extruder_count();
                    queue.extend(machine.set_extruder_count(count));
                }
            }
        }
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notifications.send(notification);
    }

    fn reject(&self, err: SessionError) -> SessionError {
        info!("intent rejected: {err}");
        self.notify(Notification::Problem(err.to_problem()));
        err
    }

    async fn submit<F>(&self, operation: &'static str, request: F) -> Result<(), SessionError>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        request.await.map_err(|source| {
            let err = SessionError::Link { operation, source };
            error!("{err}");
            self.notify(Notification::Problem(err.to_problem()));
            err
        })
    }

    async fn connection(&self) -> Result<ConnectionParams, SessionError> {
        let connection = {
            let machine = self.machine.lock().await;
            machine.session().connection.clone()
        };
        connection.ok_or_else(|| self.reject(SessionError::NotConnected))
    }

    async fn send_gcode(&self, operation: &'static str, code: GCode) -> Result<(), SessionError> {
        let command = code.to_command();
        debug!(operation, command = %command, "sending command");
        self.submit(operation, self.link.send_command(&command)).await
    }

    pub async fn connect(&self, profile_name: &str, port: &str) -> Result<(), SessionError> {
        let params = assemble_connection_params(self.profiles.as_ref(), profile_name, port)
            .map_err(|err| self.reject(err))?;

        let outcome = self.machine.lock().await.begin_connect(params.clone());
        match outcome.map_err(|err| self.reject(err))? {
            ConnectOutcome::AlreadyConnected => {
                info!(port = %params.port, "printer already connected on this port");
                return Ok(());
            }
            ConnectOutcome::Opening => {}
        }

        info!(
            profile = %params.profile_name,
            port = %params.port,
            baud = params.baud,
            firmware = %params.firmware,
            "connecting to printer"
        );
        let result = async {
            if let Some(firmware) = params.explicit_firmware() {
                self.submit(
                    "load firmware profile",
                    self.link.load_firmware_profile(firmware),
                )
                .await?;
            }
            self.submit("open connection", self.link.open(&params.port, params.baud))
                .await
        }
        .await;

        if result.is_err() {
            self.machine.lock().await.abort_connect();
        }
        result
    }

    /// Always accepted, whatever the state.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.machine.lock().await.note_disconnect_requested();
        info!("disconnect requested");
        let result = self.submit("close connection", self.link.close()).await;
        if result.is_err() {
            self.machine.lock().await.abort_disconnect();
        }
        result
    }

    pub async fn print(&self) -> Result<(), SessionError> {
        let files = self.open_files.read().await.clone();
        if files.is_empty() {
            return Err(self.reject(SessionError::NoOpenFiles));
        }
        let state = self.state().await;
        if state != PrinterState::Idle {
            return Err(self.reject(SessionError::NotIdle { state }));
        }

        let file = match resolve_print_file(&files, self.chooser.as_ref())
            .await
            .map_err(|err| self.reject(err))?
        {
            FileSelection::Selected(file) => file,
            FileSelection::Cancelled => {
                info!("print abandoned at file choice");
                return Ok(());
            }
        };

        // The choice may have taken a while.
        let state = self.state().await;
        if state != PrinterState::Idle {
            return Err(self.reject(SessionError::NotIdle { state }));
        }
        info!(file = %file.display(), "starting print");
        self.submit("start print", self.link.start_print(&file)).await
    }

    /// Pauses a running print. While paused this resumes instead; in any
    /// other state it does nothing.
    pub async fn pause(&self) -> Result<(), SessionError> {
        let (state, post_pause) = {
            let machine = self.machine.lock().await;
            let post_pause = machine
                .session()
                .pending_post_pause()
                .unwrap_or_default()
                .to_string();
            (machine.state(), post_pause)
        };
        match state {
            PrinterState::Busy => {
                info!(post_pause = %post_pause, "pausing print");
                self.submit("pause print", self.link.pause_print(&post_pause))
                    .await
            }
            PrinterState::Pause => {
                info!("resuming print");
                self.submit("resume print", self.link.resume_print()).await
            }
            _ => {
                debug!(%state, "pause ignored");
                Ok(())
            }
        }
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        let state = self.state().await;
        if state != PrinterState::Pause {
            debug!(%state, "resume ignored");
            return Ok(());
        }
        info!("resuming print");
        self.submit("resume print", self.link.resume_print()).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        let state = self.state().await;
        if !state.is_printing() {
            debug!(%state, "stop ignored");
            return Ok(());
        }
        info!("stopping print");
        self.submit("stop print", self.link.stop_print()).await
    }

    /// Always accepted, whatever the state.
    pub async fn disable_motors(&self) -> Result<(), SessionError> {
        info!("disabling motors");
        self.send_gcode("disable motors", GCode::DisableMotors).await
    }

    /// Relative move of one axis. Jogs run one at a time; a jog arriving
    /// while another is in flight waits for it to finish.
    pub async fn jog_axis(&self, axis: Axis, distance: f64) -> Result<(), SessionError> {
        self.connection().await?;
        let _turn = self.jog_queue.lock().await;

        self.send_gcode("jog", GCode::RelativePositioning).await?;
        let moved = self
            .send_gcode("jog", GCode::LinearMove { axis, distance })
            .await;
        let restored = self.send_gcode("jog", GCode::AbsolutePositioning).await;
        moved.and(restored)
    }

    pub async fn set_bed_target(&self, celsius: u32) -> Result<(), SessionError> {
        let connection = self.connection().await?;
        let celsius = clamp_to_ceiling("bed", celsius, connection.bed_temp_max);
        self.send_gcode("set bed temperature", GCode::SetBedTemperature(celsius))
            .await
    }

    pub async fn set_extruder_target(&self, celsius: u32) -> Result<(), SessionError> {
        let connection = self.connection().await?;
        let celsius = clamp_to_ceiling("extruder", celsius, connection.extruder_temp_max);
        self.send_gcode(
            "set extruder temperature",
            GCode::SetExtruderTemperature(celsius),
        )
        .await
    }

    pub async fn set_fan_speed(&self, percent: u8) -> Result<(), SessionError> {
        self.connection().await?;
        self.send_gcode("set fan speed", GCode::fan_percent(percent))
            .await
    }

    pub async fn set_flow_rate(&self, percent: u32) -> Result<(), SessionError> {
        self.connection().await?;
        self.send_gcode("set flow rate", GCode::FlowRate(percent))
            .await
    }

    pub async fn set_print_speed(&self, percent: u32) -> Result<(), SessionError> {
        self.connection().await?;
        self.send_gcode("set print speed", GCode::SpeedFactor(percent))
            .await
    }

    pub async fn push_raw_command(&self, command: &str) -> Result<(), SessionError> {
        let command = command.trim();
        if command.is_empty() {
            return Ok(());
        }
        self.connection().await?;
        self.notify(Notification::LogLine {
            source: LogSource::Session,
            text: format!("Push {command}"),
        });
        self.submit("push command", self.link.send_command(command))
            .await
    }

    pub async fn set_open_files(&self, files: Vec<PathBuf>) {
        info!(count = files.len(), "open files updated");
        *self.open_files.write().await = files;
    }
}

fn clamp_to_ceiling(heater: &str, celsius: u32, ceiling: u32) -> u32 {
    if ceiling > 0 && celsius > ceiling {
        warn!(
            heater,
            requested = celsius,
            ceiling,
            "target temperature above profile maximum; clamping"
        );
        ceiling
    } else {
        celsius
    }
}
