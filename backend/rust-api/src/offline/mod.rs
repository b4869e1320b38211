//! Offline-first quiz client.
//!
//! Lectures are cached for quiz-taking without a connection, progress is kept
//! per lecture on disk, and finished quizzes wait in a [`SyncQueue`] until
//! they can be uploaded to `POST /api/v1/results`.

pub mod cache;
pub mod client;
pub mod progress;
pub mod remote;
pub mod sync_queue;

pub use cache::KeyedCache;
pub use client::{QuizClient, QuizStats};
pub use progress::{AnswerRecord, ProgressStore, QuizProgress};
pub use remote::{HttpQuizApi, LectureSource, RemoteError, ResultUploader, UploadOutcome};
pub use sync_queue::{DrainReport, PendingResult, SyncQueue};

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum OfflineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt offline data in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{0}' cannot be used as an offline storage key")]
    InvalidKey(String),

    #[error("Lecture {lecture_id} is unavailable online and has no offline copy")]
    ContentUnavailable { lecture_id: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type OfflineResult<T> = Result<T, OfflineError>;

fn io_error(path: &Path, source: std::io::Error) -> OfflineError {
    OfflineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads a JSON document; a missing file is `None`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> OfflineResult<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| OfflineError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes through a sibling temp file and a rename, so a crash mid-write
/// leaves the previous document in place.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> OfflineResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| OfflineError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| io_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error(path, e))
}

async fn remove_file(path: &Path) -> OfflineResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path, e)),
    }
}
