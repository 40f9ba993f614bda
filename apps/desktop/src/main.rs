use std::{
    io::{self, BufRead},
    path::PathBuf,
    thread,
};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, select, unbounded};
use tracing_subscriber::EnvFilter;

mod backend;
mod chooser;
mod commands;
mod console;
mod events;
mod orchestration;
mod presenter;
mod settings;

use backend::spawn_backend_thread;
use commands::BackendCommand;
use console::{Console, Flow};
use events::UiEvent;
use presenter::Presenter;
use settings::{load_settings, DEFAULT_SETTINGS_FILE};

/// Console front end for one 3D printer session.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file; missing files are ignored.
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    /// Printer profiles file, overriding the settings.
    #[arg(long)]
    profiles: Option<PathBuf>,
    /// Print notifications as JSON lines.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (mut settings, settings_warnings) = load_settings(&args.config);
    if let Some(profiles) = args.profiles {
        settings.profiles_path = profiles;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    for warning in settings_warnings {
        tracing::warn!(config = %args.config.display(), "{warning}");
    }

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    let backend = spawn_backend_thread(settings, cmd_rx, ui_tx);

    let (line_tx, line_rx) = unbounded::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut console = Console::new(cmd_tx, Presenter::new(args.json), io::stdout());
    loop {
        select! {
            recv(line_rx) -> line => match line {
                Ok(line) => {
                    if console.handle_line(&line)? == Flow::Quit {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(ui_rx) -> event => match event {
                Ok(event) => console.handle_event(event)?,
                Err(_) => {
                    tracing::error!("backend worker exited");
                    break;
                }
            },
        }
    }

    // Closing the command queue lets the backend disconnect and exit.
    drop(console);
    drop(ui_rx);
    if backend.join().is_err() {
        tracing::error!("backend worker panicked");
    }
    Ok(())
}
