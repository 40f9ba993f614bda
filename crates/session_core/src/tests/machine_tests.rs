use super::*;
use crate::types::PrintAction;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use shared::domain::TemperatureKind;
use shared::domain::PrinterState::*;

fn params() -> ConnectionParams {
    ConnectionParams {
        profile_name: "Ender3".to_string(),
        port: "COM4".to_string(),
        baud: 115_200,
        firmware: "Marlin".to_string(),
        bed_temp_max: 110,
        extruder_temp_max: 260,
        post_pause: "G1 Z10".to_string(),
    }
}

fn state_event(state: PrinterState) -> DeviceEvent {
    DeviceEvent::StateChanged(state)
}

fn connected_machine() -> SessionMachine {
    let mut machine = SessionMachine::new();
    machine.begin_connect(params()).expect("connect accepted");
    machine.apply(state_event(Connecting));
    machine.apply(state_event(Idle));
    machine.set_extruder_count(1);
    machine
}

fn notifications(effects: &[Effect]) -> Vec<&Notification> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Notify(notification) => Some(notification),
            _ => None,
        })
        .collect()
}

fn state_label(effects: &[Effect]) -> Option<String> {
    notifications(effects)
        .into_iter()
        .find_map(|notification| match notification {
            Notification::StateChanged { label, .. } => Some(label.clone()),
            _ => None,
        })
}

fn problem_code(effects: &[Effect]) -> Option<ErrorCode> {
    notifications(effects)
        .into_iter()
        .find_map(|notification| match notification {
            Notification::Problem(problem) => Some(problem.code),
            _ => None,
        })
}

#[test]
fn connect_handshake_sets_poll_rates_and_announces_port() {
    let mut machine = SessionMachine::new();
    assert_eq!(
        machine.begin_connect(params()).expect("accepted"),
        ConnectOutcome::Opening
    );
    assert!(machine.session().connection.is_none());

    let connecting = machine.apply(state_event(Connecting));
    assert!(connecting.contains(&Effect::SetPollInterval(PollRate::Fast)));
    assert_eq!(machine.session().connection, Some(params()));
    assert!(!machine.has_pending_connect());

    let idle = machine.apply(state_event(Idle));
    assert_eq!(state_label(&idle).as_deref(), Some("Connected to COM4"));
    assert!(idle.contains(&Effect::RefreshExtruderCount));
    assert!(idle.contains(&Effect::SetPollInterval(PollRate::Idle)));
    assert!(idle.contains(&Effect::Notify(Notification::LogLine {
        source: LogSource::Session,
        text: "Serial connected".to_string(),
    })));
    assert!(idle.contains(&Effect::Notify(Notification::Controls(
        ControlAvailability::for_state(Idle)
    ))));
}

#[test]
fn full_print_cycle_follows_the_transition_table() {
    let mut machine = connected_machine();
    assert_eq!(machine.session().extruder_count, 1);

    for (event, expected) in [
        (StartPrint, StartPrint),
        (Busy, Busy),
        (Pause, Pause),
        (Busy, Busy),
        (FinishedPrint, FinishedPrint),
        (Idle, Idle),
    ] {
        machine.apply(state_event(event));
        assert_eq!(machine.state(), expected);
    }
    assert!(machine.session().connection.is_some());
}

#[test]
fn unexpected_state_reports_are_dropped() {
    let mut machine = connected_machine();
    assert!(machine.apply(state_event(Busy)).is_empty());
    assert!(machine.apply(state_event(Pause)).is_empty());
    assert!(machine.apply(state_event(FinishedPrint)).is_empty());
    assert_eq!(machine.state(), Idle);

    let mut fresh = SessionMachine::new();
    assert!(fresh.apply(state_event(Connecting)).is_empty());
    assert!(fresh.apply(state_event(ErrorState)).is_empty());
    assert_eq!(fresh.state(), Disconnected);
}

#[test]
fn repeated_state_report_has_no_effect() {
    let mut machine = connected_machine();
    assert!(machine.apply(state_event(Idle)).is_empty());
}

#[test]
fn requested_disconnect_clears_session_quietly() {
    let mut machine = connected_machine();
    machine.note_disconnect_requested();

    let effects = machine.apply(state_event(Disconnected));

    assert_eq!(machine.state(), Disconnected);
    assert_eq!(machine.session().connection, None);
    assert_eq!(machine.session().extruder_count, 0);
    assert_eq!(state_label(&effects).as_deref(), Some("Not Connected"));
    assert_eq!(problem_code(&effects), None);
    assert!(effects.contains(&Effect::SetPollInterval(PollRate::Default)));
}

#[test]
fn unrequested_disconnect_is_reported_as_link_loss() {
    let mut machine = connected_machine();
    machine.apply(state_event(StartPrint));
    machine.apply(state_event(Busy));

    let effects = machine.apply(state_event(Disconnected));

    assert_eq!(machine.state(), Disconnected);
    assert_eq!(machine.session().connection, None);
    assert_eq!(state_label(&effects).as_deref(), Some("Connection lost"));
    assert_eq!(problem_code(&effects), Some(ErrorCode::LinkLoss));
}

#[test]
fn withdrawn_disconnect_intent_leaves_link_loss_reported() {
    let mut machine = connected_machine();
    machine.note_disconnect_requested();
    machine.abort_disconnect();

    let effects = machine.apply(state_event(Disconnected));

    assert_eq!(state_label(&effects).as_deref(), Some("Connection lost"));
    assert_eq!(problem_code(&effects), Some(ErrorCode::LinkLoss));
}

#[test]
fn fault_from_any_connected_state_enters_error_state() {
    for path in [
        vec![],
        vec![StartPrint],
        vec![StartPrint, Busy],
        vec![StartPrint, Busy, Pause],
        vec![StartPrint, Busy, Stop],
        vec![StartPrint, Busy, FinishedPrint],
    ] {
        let mut machine = connected_machine();
        for state in path {
            machine.apply(state_event(state));
        }
        let effects = machine.apply(state_event(ErrorState));
        assert_eq!(machine.state(), ErrorState);
        assert_eq!(problem_code(&effects), Some(ErrorCode::DeviceFault));
        assert_eq!(machine.session().connection, Some(params()));

        machine.note_disconnect_requested();
        machine.apply(state_event(Disconnected));
        assert_eq!(machine.state(), Disconnected);
        assert_eq!(machine.session().connection, None);
    }
}

#[test]
fn fault_during_handshake_keeps_the_pending_connection() {
    let mut machine = SessionMachine::new();
    machine.begin_connect(params()).expect("accepted");
    machine.apply(state_event(ErrorState));
    assert_eq!(machine.state(), ErrorState);
    assert_eq!(machine.session().connection, Some(params()));
}

#[test]
fn second_connect_is_rejected_or_reuses_idle_session() {
    let mut machine = SessionMachine::new();
    machine.begin_connect(params()).expect("accepted");
    assert!(matches!(
        machine.begin_connect(params()),
        Err(SessionError::SessionActive { state: Connecting })
    ));

    let mut machine = connected_machine();
    assert_eq!(
        machine.begin_connect(params()).expect("same target"),
        ConnectOutcome::AlreadyConnected
    );
    let other_port = ConnectionParams {
        port: "COM5".to_string(),
        ..params()
    };
    assert!(matches!(
        machine.begin_connect(other_port),
        Err(SessionError::SessionActive { state: Idle })
    ));

    machine.apply(state_event(StartPrint));
    assert!(matches!(
        machine.begin_connect(params()),
        Err(SessionError::SessionActive { state: StartPrint })
    ));
}

#[test]
fn aborted_connect_allows_a_new_attempt() {
    let mut machine = SessionMachine::new();
    machine.begin_connect(params()).expect("accepted");
    machine.abort_connect();
    assert!(!machine.has_pending_connect());
    assert_eq!(
        machine.begin_connect(params()).expect("accepted again"),
        ConnectOutcome::Opening
    );
}

#[test]
fn telemetry_while_disconnected_is_dropped() {
    let mut machine = SessionMachine::new();
    for event in [
        DeviceEvent::TemperatureSample {
            sensor: 0,
            index: 0,
            value: 60.0,
        },
        DeviceEvent::LineReceived(b"ok\n".to_vec()),
        DeviceEvent::LineSent(b"M105\n".to_vec()),
        DeviceEvent::PrintProgress(10.0),
        DeviceEvent::ExtruderCountKnown(2),
    ] {
        assert!(machine.apply(event).is_empty());
        assert_eq!(machine.state(), Disconnected);
    }
    assert_eq!(machine.session().extruder_count, 0);
}

#[test]
fn port_list_is_forwarded_in_any_state() {
    let mut machine = SessionMachine::new();
    let ports = vec!["COM3".to_string(), "COM4".to_string()];
    let effects = machine.apply(DeviceEvent::PortListChanged(ports.clone()));
    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::PortsChanged(ports))]
    );
}

#[test]
fn temperature_sample_reaches_history_and_log() {
    let mut machine = connected_machine();
    let effects = machine.apply(DeviceEvent::TemperatureSample {
        sensor: 3,
        index: 0,
        value: 200.0,
    });

    let expected = TemperatureReading {
        channel: TemperatureChannel::Extruder(0),
        kind: TemperatureKind::Target,
        value: 200.0,
    };
    assert_eq!(
        effects,
        vec![
            Effect::Notify(Notification::Telemetry(expected)),
            Effect::Notify(Notification::LogLine {
                source: LogSource::Received,
                text: "Extruder Target Temperature [0] : 200".to_string(),
            }),
        ]
    );
}

#[test]
fn unknown_sensor_or_channel_is_dropped_without_state_change() {
    let mut machine = connected_machine();
    for (sensor, index) in [(4, 0), (7, 0), (2, 1), (0, 3)] {
        let effects = machine.apply(DeviceEvent::TemperatureSample {
            sensor,
            index,
            value: 42.0,
        });
        assert!(effects.is_empty(), "sensor {sensor} index {index}");
        assert_eq!(machine.state(), Idle);
    }

    machine.apply(DeviceEvent::ExtruderCountKnown(2));
    assert_eq!(
        notifications(&machine.apply(DeviceEvent::TemperatureSample {
            sensor: 2,
            index: 1,
            value: 42.0,
        }))
        .len(),
        2
    );
}

#[test]
fn raw_lines_are_escaped_before_logging() {
    let mut machine = connected_machine();
    let effects = machine.apply(DeviceEvent::LineReceived(
        b"ok\r\nT:200.0 /200.0\r\n".to_vec(),
    ));
    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::LogLine {
            source: LogSource::Received,
            text: "ok\\r\\nT:200.0 /200.0\\r\\n".to_string(),
        })]
    );

    let sent = machine.apply(DeviceEvent::LineSent(b"G28\n".to_vec()));
    assert_eq!(
        sent,
        vec![Effect::Notify(Notification::LogLine {
            source: LogSource::Sent,
            text: "G28\\n".to_string(),
        })]
    );
}

#[test]
fn progress_is_ignored_once_the_print_finished() {
    let mut machine = connected_machine();
    machine.apply(state_event(StartPrint));
    machine.apply(state_event(Busy));
    assert_eq!(
        machine.apply(DeviceEvent::PrintProgress(140.0)),
        vec![Effect::Notify(Notification::Progress(100.0))]
    );

    machine.apply(state_event(FinishedPrint));
    assert!(machine.apply(DeviceEvent::PrintProgress(100.0)).is_empty());
    assert_eq!(machine.state(), FinishedPrint);
}

#[test]
fn controls_follow_state() {
    let busy = ControlAvailability::for_state(Busy);
    assert!(busy.controls_enabled);
    assert!(!busy.disconnect_enabled);
    assert!(busy.progress_visible);
    assert_eq!(busy.print_action, PrintAction::Pause);

    let paused = ControlAvailability::for_state(Pause);
    assert_eq!(paused.print_action, PrintAction::Resume);

    let finished = ControlAvailability::for_state(FinishedPrint);
    assert!(!finished.progress_visible);
    assert_eq!(finished.print_action, PrintAction::Print);

    let idle = ControlAvailability::for_state(Idle);
    assert!(idle.controls_enabled);
    assert!(idle.disconnect_enabled);

    let disconnected = ControlAvailability::for_state(Disconnected);
    assert!(!disconnected.controls_enabled);
    assert!(!disconnected.disconnect_enabled);
}

const TABLE: &[(PrinterState, PrinterState)] = &[
    (Connecting, Idle),
    (Idle, StartPrint),
    (StartPrint, Busy),
    (Busy, Pause),
    (Pause, Busy),
    (StartPrint, FinishedPrint),
    (Busy, FinishedPrint),
    (StartPrint, Stop),
    (Busy, Stop),
    (Pause, Stop),
    (Stop, Idle),
    (FinishedPrint, Idle),
];

fn reference_step(current: PrinterState, next: PrinterState, pending: bool) -> PrinterState {
    if current == next {
        return current;
    }
    if current == Disconnected {
        return if pending && matches!(next, Connecting | ErrorState) {
            next
        } else {
            current
        };
    }
    if matches!(next, Disconnected | ErrorState) || TABLE.contains(&(current, next)) {
        next
    } else {
        current
    }
}

#[test]
fn state_is_a_fold_of_the_event_history() {
    let telemetry = [
        DeviceEvent::TemperatureSample {
            sensor: 0,
            index: 0,
            value: 55.0,
        },
        DeviceEvent::TemperatureSample {
            sensor: 6,
            index: 0,
            value: 55.0,
        },
        DeviceEvent::PrintProgress(33.0),
        DeviceEvent::LineReceived(b"ok\n".to_vec()),
        DeviceEvent::ExtruderCountKnown(1),
    ];

    for seed in 0..200u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut machine = SessionMachine::new();
        machine.begin_connect(params()).expect("accepted");
        let mut expected = Disconnected;
        let mut pending = true;
        let mut history = Vec::new();

        for _ in 0..40 {
            let event = if rng.gen_ratio(1, 3) {
                telemetry.choose(&mut rng).expect("telemetry").clone()
            } else {
                DeviceEvent::StateChanged(*PrinterState::ALL.choose(&mut rng).expect("state"))
            };
            history.push(event.clone());

            if let DeviceEvent::StateChanged(next) = event {
                let stepped = reference_step(expected, next, pending);
                if expected == Disconnected && stepped != Disconnected {
                    pending = false;
                }
                expected = stepped;
            }
            machine.apply(event);
            assert_eq!(machine.state(), expected, "seed {seed}");
            assert_eq!(
                machine.session().connection.is_some(),
                expected != Disconnected,
                "seed {seed}"
            );
        }

        let mut replay = SessionMachine::new();
        replay.begin_connect(params()).expect("accepted");
        for event in history {
            replay.apply(event);
        }
        assert_eq!(replay.session(), machine.session(), "seed {seed}");
    }
}
