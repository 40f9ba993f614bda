//! Events flowing from the backend worker to the console loop.

use std::path::PathBuf;

use session_core::{Notification, SessionSnapshot};
use tokio::sync::oneshot;

pub enum UiEvent {
    Info(String),
    Error(String),
    Notification(Notification),
    Snapshot(SessionSnapshot),
    Profiles(Vec<String>),
    /// The backend is waiting for the user to pick one of `candidates`.
    ChooseFile {
        candidates: Vec<PathBuf>,
        reply: oneshot::Sender<Option<PathBuf>>,
    },
}
