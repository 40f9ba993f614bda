use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::error::SessionError;

/// Modal file choice offered by the presentation layer when more than one
/// file is open.
#[async_trait]
pub trait FileChooser: Send + Sync {
    /// Returns the chosen candidate, or `None` if the user cancelled.
    async fn choose_file(&self, candidates: &[PathBuf]) -> Option<PathBuf>;
}

/// Chooser for headless use: every choice is cancelled.
pub struct CancelFileChoice;

#[async_trait]
impl FileChooser for CancelFileChoice {
    async fn choose_file(&self, _candidates: &[PathBuf]) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelection {
    Selected(PathBuf),
    Cancelled,
}

/// Resolves a print intent to a single file. The chooser is consulted only
/// when there is more than one candidate.
pub async fn resolve_print_file(
    open_files: &[PathBuf],
    chooser: &dyn FileChooser,
) -> Result<FileSelection, SessionError> {
    match open_files {
        [] => Err(SessionError::NoOpenFiles),
        [only] => Ok(FileSelection::Selected(only.clone())),
        candidates => match chooser.choose_file(candidates).await {
            Some(path) if is_candidate(candidates, &path) => Ok(FileSelection::Selected(path)),
            Some(path) => {
                warn!(file = %path.display(), "file choice is not one of the open files");
                Ok(FileSelection::Cancelled)
            }
            None => Ok(FileSelection::Cancelled),
        },
    }
}

fn is_candidate(candidates: &[PathBuf], path: &Path) -> bool {
    candidates.iter().any(|candidate| candidate == path)
}
