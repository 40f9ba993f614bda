//! Console input parsing and the commands queued for the backend worker.

use std::path::PathBuf;

use shared::domain::Axis;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    Connect { profile: String, port: String },
    Disconnect,
    Print,
    Pause,
    Resume,
    Stop,
    DisableMotors,
    Jog { axis: Axis, distance: f64 },
    BedTarget(u32),
    ExtruderTarget(u32),
    FanSpeed(u8),
    FlowRate(u32),
    PrintSpeed(u32),
    Push(String),
    OpenFiles(Vec<PathBuf>),
    ListProfiles,
    ListPorts,
    Status,
    /// Simulated printer only.
    InjectFault,
    /// Simulated printer only.
    DropConnection,
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::Connect { .. } => "connect",
            BackendCommand::Disconnect => "disconnect",
            BackendCommand::Print => "print",
            BackendCommand::Pause => "pause",
            BackendCommand::Resume => "resume",
            BackendCommand::Stop => "stop",
            BackendCommand::DisableMotors => "motors_off",
            BackendCommand::Jog { .. } => "jog",
            BackendCommand::BedTarget(_) => "bed",
            BackendCommand::ExtruderTarget(_) => "extruder",
            BackendCommand::FanSpeed(_) => "fan",
            BackendCommand::FlowRate(_) => "flow",
            BackendCommand::PrintSpeed(_) => "speed",
            BackendCommand::Push(_) => "push",
            BackendCommand::OpenFiles(_) => "open",
            BackendCommand::ListProfiles => "profiles",
            BackendCommand::ListPorts => "ports",
            BackendCommand::Status => "status",
            BackendCommand::InjectFault => "fault",
            BackendCommand::DropConnection => "unplug",
        }
    }
}

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Backend(BackendCommand),
    /// Answer to a pending file choice; `None` cancels it.
    Choose(Option<usize>),
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "\
commands:
  connect <profile> <port>   open a session
  disconnect                 close the session
  open <file>...             set the open files
  print | pause | resume | stop
  jog <x|y|z|e> <mm>         relative move
  bed <C> | extruder <C>     heater targets
  fan <%> | flow <%> | speed <%>
  motors-off                 disable steppers
  send <gcode>               push a raw command
  profiles | ports | status
  choose <n> | cancel        answer a file choice
  fault | unplug             simulated printer faults
  help | quit";

pub fn parse_console_line(line: &str) -> Result<ConsoleInput, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(ConsoleInput::Empty),
        "help" | "?" => return Ok(ConsoleInput::Help),
        "quit" | "exit" => return Ok(ConsoleInput::Quit),
        "cancel" => return Ok(ConsoleInput::Choose(None)),
        "choose" => {
            let n: usize = number(&args, 0, "choose <n>")?;
            if n == 0 {
                return Err("choices are numbered from 1".to_string());
            }
            return Ok(ConsoleInput::Choose(Some(n - 1)));
        }
        "connect" => match args.as_slice() {
            [profile, port] => BackendCommand::Connect {
                profile: profile.to_string(),
                port: port.to_string(),
            },
            _ => return Err("usage: connect <profile> <port>".to_string()),
        },
        "disconnect" => BackendCommand::Disconnect,
        "print" => BackendCommand::Print,
        "pause" => BackendCommand::Pause,
        "resume" => BackendCommand::Resume,
        "stop" => BackendCommand::Stop,
        "motors-off" | "m18" => BackendCommand::DisableMotors,
        "jog" => {
            let axis = args
                .first()
                .ok_or_else(|| "usage: jog <axis> <mm>".to_string())?
                .parse::<Axis>()
                .map_err(|err| err.to_string())?;
            BackendCommand::Jog {
                axis,
                distance: number(&args, 1, "jog <axis> <mm>")?,
            }
        }
        "bed" => BackendCommand::BedTarget(number(&args, 0, "bed <celsius>")?),
        "extruder" => BackendCommand::ExtruderTarget(number(&args, 0, "extruder <celsius>")?),
        "fan" => BackendCommand::FanSpeed(number(&args, 0, "fan <0-100>")?),
        "flow" => BackendCommand::FlowRate(number(&args, 0, "flow <percent>")?),
        "speed" => BackendCommand::PrintSpeed(number(&args, 0, "speed <percent>")?),
        "send" => BackendCommand::Push(rest.to_string()),
        "open" => BackendCommand::OpenFiles(args.iter().map(PathBuf::from).collect()),
        "profiles" => BackendCommand::ListProfiles,
        "ports" => BackendCommand::ListPorts,
        "status" => BackendCommand::Status,
        "fault" => BackendCommand::InjectFault,
        "unplug" => BackendCommand::DropConnection,
        other => return Err(format!("unknown command '{other}'; type 'help'")),
    };
    Ok(ConsoleInput::Backend(command))
}

fn number<T: std::str::FromStr>(args: &[&str], at: usize, usage: &str) -> Result<T, String> {
    args.get(at)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| format!("usage: {usage}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(line: &str) -> BackendCommand {
        match parse_console_line(line) {
            Ok(ConsoleInput::Backend(command)) => command,
            other => panic!("expected a backend command for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_session_commands() {
        assert_eq!(
            backend("connect Ender3 COM4"),
            BackendCommand::Connect {
                profile: "Ender3".to_string(),
                port: "COM4".to_string(),
            }
        );
        assert_eq!(
            backend("  JOG z -0.5 "),
            BackendCommand::Jog {
                axis: Axis::Z,
                distance: -0.5,
            }
        );
        assert_eq!(backend("fan 50"), BackendCommand::FanSpeed(50));
        assert_eq!(
            backend("send G28   X"),
            BackendCommand::Push("G28   X".to_string())
        );
        assert_eq!(
            backend("open a.gcode b.gcode"),
            BackendCommand::OpenFiles(vec![PathBuf::from("a.gcode"), PathBuf::from("b.gcode")])
        );
    }

    #[test]
    fn parses_console_controls() {
        assert_eq!(parse_console_line(""), Ok(ConsoleInput::Empty));
        assert_eq!(parse_console_line("quit"), Ok(ConsoleInput::Quit));
        assert_eq!(parse_console_line("cancel"), Ok(ConsoleInput::Choose(None)));
        assert_eq!(
            parse_console_line("choose 2"),
            Ok(ConsoleInput::Choose(Some(1)))
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_console_line("connect Ender3").is_err());
        assert!(parse_console_line("jog w 10").is_err());
        assert!(parse_console_line("fan 300").is_err());
        assert!(parse_console_line("choose 0").is_err());
        assert!(parse_console_line("levitate").is_err());
    }
}
