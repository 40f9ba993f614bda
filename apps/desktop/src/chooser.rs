use std::path::PathBuf;

use async_trait::async_trait;
use crossbeam_channel::{Sender, TrySendError};
use session_core::FileChooser;
use tokio::sync::oneshot;

use crate::events::UiEvent;

/// Asks the console loop to pick a file and waits for the answer.
pub struct ConsoleFileChooser {
    ui_tx: Sender<UiEvent>,
}

impl ConsoleFileChooser {
    pub fn new(ui_tx: Sender<UiEvent>) -> Self {
        Self { ui_tx }
    }
}

#[async_trait]
impl FileChooser for ConsoleFileChooser {
    async fn choose_file(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        let (reply, answer) = oneshot::channel();
        let request = UiEvent::ChooseFile {
            candidates: candidates.to_vec(),
            reply,
        };
        match self.ui_tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("console event queue full; file choice cancelled");
                return None;
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("console loop gone; file choice cancelled");
                return None;
            }
        }
        // A dropped reply counts as a cancel.
        answer.await.ok().flatten()
    }
}
