//! Backend worker: owns the tokio runtime, the device link and the session
//! controller, and bridges them to the console loop over crossbeam channels.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use device_link::{DeviceLink, SimulatedPrinter, SimulatedPrinterOptions};
use profile_store::{ProfileStore, TomlProfileStore};
use session_core::{SessionController, SessionError, SessionHandle};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    chooser::ConsoleFileChooser, commands::BackendCommand, events::UiEvent, settings::Settings,
};

pub fn spawn_backend_thread(
    settings: Settings,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.send(UiEvent::Error(format!(
                    "backend worker startup failure: failed to build runtime: {err}"
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(run_backend(settings, cmd_rx, ui_tx));
    })
}

async fn run_backend(
    settings: Settings,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) {
    let profiles: Arc<dyn ProfileStore> =
        match TomlProfileStore::load_or_empty(&settings.profiles_path) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                let _ = ui_tx.send(UiEvent::Error(format!(
                    "backend worker startup failure: {err}"
                )));
                tracing::error!("failed to load printer profiles: {err}");
                return;
            }
        };

    let printer = Arc::new(SimulatedPrinter::new(SimulatedPrinterOptions {
        extruders: settings.simulated_extruders.max(1),
        ports: settings.simulated_ports.clone(),
        ..SimulatedPrinterOptions::default()
    }));
    let link: Arc<dyn DeviceLink> = printer.clone();
    let controller = SessionController::new(
        link,
        profiles,
        Arc::new(ConsoleFileChooser::new(ui_tx.clone())),
        settings.session_settings(),
    );

    let mut notifications = controller.subscribe_notifications();
    let forward_tx = ui_tx.clone();
    let forward = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    let event = UiEvent::Notification(notification);
                    match forward_tx.try_send(event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!("console event queue full; notification dropped");
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "console fell behind; notifications dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    controller.start().await;
    printer.announce_ports();
    let _ = ui_tx.send(UiEvent::Info(format!(
        "Backend worker ready; profiles from {}",
        settings.profiles_path.display()
    )));
    let _ = ui_tx.send(UiEvent::Profiles(controller.profile_names()));

    // Intents are carried out one at a time, in the order they were typed.
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            BackendCommand::ListProfiles => {
                let _ = ui_tx.send(UiEvent::Profiles(controller.profile_names()));
            }
            BackendCommand::ListPorts => printer.announce_ports(),
            BackendCommand::Status => {
                let _ = ui_tx.send(UiEvent::Snapshot(controller.snapshot().await));
            }
            BackendCommand::InjectFault => printer.inject_fault(),
            BackendCommand::DropConnection => printer.drop_connection(),
            intent => {
                let name = intent.name();
                // Rejections are already reported as notifications.
                if let Err(err) = run_intent(&*controller, intent).await {
                    tracing::debug!(command = name, "intent not carried out: {err}");
                }
            }
        }
    }

    tracing::info!("command queue closed; shutting down backend worker");
    controller.shutdown().await;
    if let Err(err) = controller.disconnect().await {
        tracing::warn!("disconnect on shutdown failed: {err}");
    }
    forward.abort();
}

pub async fn run_intent(
    handle: &dyn SessionHandle,
    command: BackendCommand,
) -> Result<(), SessionError> {
    match command {
        BackendCommand::Connect { profile, port } => handle.connect(&profile, &port).await,
        BackendCommand::Disconnect => handle.disconnect().await,
        BackendCommand::Print => handle.print().await,
        BackendCommand::Pause => handle.pause().await,
        BackendCommand::Resume => handle.resume().await,
        BackendCommand::Stop => handle.stop().await,
        BackendCommand::DisableMotors => handle.disable_motors().await,
        BackendCommand::Jog { axis, distance } => handle.jog_axis(axis, distance).await,
        BackendCommand::BedTarget(celsius) => handle.set_bed_target(celsius).await,
        BackendCommand::ExtruderTarget(celsius) => handle.set_extruder_target(celsius).await,
        BackendCommand::FanSpeed(percent) => handle.set_fan_speed(percent).await,
        BackendCommand::FlowRate(percent) => handle.set_flow_rate(percent).await,
        BackendCommand::PrintSpeed(percent) => handle.set_print_speed(percent).await,
        BackendCommand::Push(command) => handle.push_raw_command(&command).await,
        BackendCommand::OpenFiles(files) => {
            handle.set_open_files(files).await;
            Ok(())
        }
        BackendCommand::ListProfiles
        | BackendCommand::ListPorts
        | BackendCommand::Status
        | BackendCommand::InjectFault
        | BackendCommand::DropConnection => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use profile_store::{MemoryProfileStore, StoredProfile};
    use session_core::{CancelFileChoice, Notification, SessionSettings};
    use shared::domain::PrinterState;
    use tokio::sync::broadcast;

    use super::*;

    async fn wait_for_state(rx: &mut broadcast::Receiver<Notification>, wanted: PrinterState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(Notification::StateChanged { state, .. }) = rx.recv().await {
                    if state == wanted {
                        break;
                    }
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {wanted}"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn simulated_print_runs_to_completion() {
        let printer = Arc::new(SimulatedPrinter::new(SimulatedPrinterOptions {
            progress_step: 50.0,
            progress_tick: Duration::from_millis(10),
            ..SimulatedPrinterOptions::default()
        }));
        let profiles = MemoryProfileStore::new().with_profile("Ender3", StoredProfile::default());
        let controller = SessionController::new(
            printer.clone(),
            Arc::new(profiles),
            Arc::new(CancelFileChoice),
            SessionSettings::default(),
        );
        let mut rx = controller.subscribe_notifications();
        controller.start().await;

        run_intent(
            &*controller,
            BackendCommand::Connect {
                profile: "Ender3".to_string(),
                port: "/dev/ttyUSB0".to_string(),
            },
        )
        .await
        .expect("connect");
        wait_for_state(&mut rx, PrinterState::Idle).await;

        run_intent(
            &*controller,
            BackendCommand::OpenFiles(vec![PathBuf::from("cube.gcode")]),
        )
        .await
        .expect("open files");
        run_intent(&*controller, BackendCommand::Print)
            .await
            .expect("print");
        wait_for_state(&mut rx, PrinterState::FinishedPrint).await;
        wait_for_state(&mut rx, PrinterState::Idle).await;

        run_intent(&*controller, BackendCommand::Disconnect)
            .await
            .expect("disconnect");
        wait_for_state(&mut rx, PrinterState::Disconnected).await;
        assert_eq!(controller.snapshot().await.connection, None);
        controller.shutdown().await;
    }
}
