//! Console loop state: applies typed lines and backend events, writing
//! everything the user should see to `out`.

use std::{io::Write, path::PathBuf};

use crossbeam_channel::Sender;
use tokio::sync::oneshot;

use crate::{
    commands::{parse_console_line, BackendCommand, ConsoleInput, HELP},
    events::UiEvent,
    orchestration::dispatch_backend_command,
    presenter::Presenter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

struct PendingChoice {
    candidates: Vec<PathBuf>,
    reply: oneshot::Sender<Option<PathBuf>>,
}

pub struct Console<W> {
    cmd_tx: Sender<BackendCommand>,
    presenter: Presenter,
    pending_choice: Option<PendingChoice>,
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(cmd_tx: Sender<BackendCommand>, presenter: Presenter, out: W) -> Self {
        Self {
            cmd_tx,
            presenter,
            pending_choice: None,
            out,
        }
    }

    #[cfg(test)]
    pub fn presenter(&self) -> &Presenter {
        &self.presenter
    }

    pub fn handle_line(&mut self, line: &str) -> std::io::Result<Flow> {
        let input = match parse_console_line(line) {
            Ok(input) => input,
            Err(message) => {
                writeln!(self.out, "{message}")?;
                return Ok(Flow::Continue);
            }
        };

        match input {
            ConsoleInput::Empty => {}
            ConsoleInput::Help => writeln!(self.out, "{HELP}")?,
            ConsoleInput::Quit => return Ok(Flow::Quit),
            ConsoleInput::Choose(choice) => self.answer_choice(choice)?,
            ConsoleInput::Backend(command) => {
                let mut status = String::new();
                let predicted = command.clone();
                if dispatch_backend_command(&self.cmd_tx, command, &mut status) {
                    self.presenter.note_command(&predicted);
                    if matches!(predicted, BackendCommand::Pause | BackendCommand::Resume) {
                        writeln!(self.out, "{}", self.presenter.status_line())?;
                    }
                } else {
                    writeln!(self.out, "{status}")?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn answer_choice(&mut self, choice: Option<usize>) -> std::io::Result<()> {
        let Some(pending) = self.pending_choice.take() else {
            return writeln!(self.out, "no file choice pending");
        };
        let chosen = match choice {
            None => None,
            Some(index) => match pending.candidates.get(index) {
                Some(path) => Some(path.clone()),
                None => {
                    writeln!(
                        self.out,
                        "pick a number between 1 and {}",
                        pending.candidates.len()
                    )?;
                    self.pending_choice = Some(pending);
                    return Ok(());
                }
            },
        };
        if pending.reply.send(chosen).is_err() {
            writeln!(self.out, "file choice expired")?;
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: UiEvent) -> std::io::Result<()> {
        match event {
            UiEvent::Info(message) => writeln!(self.out, "info: {message}"),
            UiEvent::Error(message) => writeln!(self.out, "error: {message}"),
            UiEvent::Notification(notification) => match self.presenter.render(&notification) {
                Some(line) => writeln!(self.out, "{line}"),
                None => Ok(()),
            },
            UiEvent::Snapshot(snapshot) => {
                let text = self.presenter.render_snapshot(&snapshot);
                writeln!(self.out, "{text}")
            }
            UiEvent::Profiles(names) if names.is_empty() => {
                writeln!(self.out, "profiles: none configured")
            }
            UiEvent::Profiles(names) => writeln!(self.out, "profiles: {}", names.join(", ")),
            UiEvent::ChooseFile { candidates, reply } => {
                writeln!(self.out, "choose a file to print:")?;
                for (n, path) in candidates.iter().enumerate() {
                    writeln!(self.out, "  {}) {}", n + 1, path.display())?;
                }
                writeln!(self.out, "type 'choose <n>' or 'cancel'")?;
                // A newer request replaces an unanswered one, cancelling it.
                self.pending_choice = Some(PendingChoice { candidates, reply });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;
    use session_core::{ControlAvailability, Notification, PrintAction};
    use shared::domain::PrinterState;

    use super::*;

    fn console() -> (Console<Vec<u8>>, crossbeam_channel::Receiver<BackendCommand>) {
        let (cmd_tx, cmd_rx) = bounded(8);
        (Console::new(cmd_tx, Presenter::new(false), Vec::new()), cmd_rx)
    }

    fn output(console: &Console<Vec<u8>>) -> String {
        String::from_utf8_lossy(&console.out).into_owned()
    }

    fn choice_request(
        console: &mut Console<Vec<u8>>,
    ) -> oneshot::Receiver<Option<PathBuf>> {
        let (reply, answer) = oneshot::channel();
        console
            .handle_event(UiEvent::ChooseFile {
                candidates: vec![PathBuf::from("a.gcode"), PathBuf::from("b.gcode")],
                reply,
            })
            .expect("write");
        answer
    }

    #[test]
    fn typed_commands_reach_the_backend_queue() {
        let (mut console, cmd_rx) = console();
        assert_eq!(
            console.handle_line("connect Ender3 COM4").expect("write"),
            Flow::Continue
        );
        assert_eq!(
            cmd_rx.try_recv().expect("queued"),
            BackendCommand::Connect {
                profile: "Ender3".to_string(),
                port: "COM4".to_string(),
            }
        );
        assert_eq!(console.handle_line("quit").expect("write"), Flow::Quit);
    }

    #[test]
    fn file_choice_is_answered_from_the_console() {
        let (mut console, _cmd_rx) = console();
        let mut answer = choice_request(&mut console);
        assert!(output(&console).contains("2) b.gcode"));

        console.handle_line("choose 5").expect("write");
        assert!(answer.try_recv().is_err());

        console.handle_line("choose 2").expect("write");
        assert_eq!(
            answer.try_recv().expect("answered"),
            Some(PathBuf::from("b.gcode"))
        );
    }

    #[test]
    fn cancel_answers_none() {
        let (mut console, _cmd_rx) = console();
        let mut answer = choice_request(&mut console);
        console.handle_line("cancel").expect("write");
        assert_eq!(answer.try_recv().expect("answered"), None);

        console.handle_line("cancel").expect("write");
        assert!(output(&console).contains("no file choice pending"));
    }

    #[test]
    fn pause_flips_the_button_label_immediately() {
        let (mut console, cmd_rx) = console();
        for notification in [
            Notification::StateChanged {
                state: PrinterState::Busy,
                label: "Printing".to_string(),
            },
            Notification::Controls(ControlAvailability::for_state(PrinterState::Busy)),
        ] {
            console
                .handle_event(UiEvent::Notification(notification))
                .expect("write");
        }

        console.handle_line("pause").expect("write");
        assert_eq!(cmd_rx.try_recv().expect("queued"), BackendCommand::Pause);
        assert_eq!(console.presenter().print_action(), PrintAction::Resume);
        assert!(output(&console).contains("button: Resume"));
    }

    #[test]
    fn closed_backend_is_reported() {
        let (mut console, cmd_rx) = console();
        drop(cmd_rx);
        console.handle_line("print").expect("write");
        assert!(output(&console).contains("Backend worker stopped"));
    }
}
