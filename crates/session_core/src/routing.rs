//! Dispatch table deciding which device events reach subscribers in each
//! session state.

use device_link::DeviceEventKind;
use shared::domain::PrinterState;

use DeviceEventKind::*;

const UNLINKED: &[DeviceEventKind] = &[StateChanged, PortList];
const LINKED: &[DeviceEventKind] = &[
    StateChanged,
    PortList,
    Temperature,
    LineReceived,
    LineSent,
    ExtruderCount,
];
const PRINTING: &[DeviceEventKind] = &[
    StateChanged,
    PortList,
    Temperature,
    LineReceived,
    LineSent,
    ExtruderCount,
    Progress,
];

/// Event kinds with a subscriber while the session is in `state`.
pub fn subscriptions(state: PrinterState) -> &'static [DeviceEventKind] {
    match state {
        PrinterState::Disconnected => UNLINKED,
        PrinterState::Connecting
        | PrinterState::Idle
        | PrinterState::FinishedPrint
        | PrinterState::ErrorState => LINKED,
        PrinterState::StartPrint | PrinterState::Busy | PrinterState::Pause | PrinterState::Stop => {
            PRINTING
        }
    }
}

pub fn routes(state: PrinterState, kind: DeviceEventKind) -> bool {
    subscriptions(state).contains(&kind)
}

/// Measurement or traffic data, as opposed to link-level bookkeeping.
pub fn is_telemetry(kind: DeviceEventKind) -> bool {
    !matches!(kind, StateChanged | PortList)
}

/// Keeps a raw serial line on one log row.
pub fn escape_line(text: &str) -> String {
    text.replace('\n', "\\n").replace('\r', "\\r")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_line_endings_literally() {
        assert_eq!(
            escape_line("ok\r\nT:200.0 /200.0\r\n"),
            "ok\\r\\nT:200.0 /200.0\\r\\n"
        );
        assert_eq!(escape_line("plain"), "plain");
    }

    #[test]
    fn disconnected_session_only_hears_link_bookkeeping() {
        for kind in [Temperature, LineReceived, LineSent, Progress, ExtruderCount] {
            assert!(!routes(PrinterState::Disconnected, kind), "{kind:?}");
        }
        assert!(routes(PrinterState::Disconnected, StateChanged));
        assert!(routes(PrinterState::Disconnected, PortList));
    }

    #[test]
    fn progress_is_subscribed_only_while_printing() {
        for state in PrinterState::ALL {
            let expected = matches!(
                state,
                PrinterState::StartPrint
                    | PrinterState::Busy
                    | PrinterState::Pause
                    | PrinterState::Stop
            );
            assert_eq!(routes(state, Progress), expected, "{state}");
        }
    }

    #[test]
    fn state_changes_are_always_routed() {
        for state in PrinterState::ALL {
            assert!(routes(state, StateChanged));
        }
    }
}
