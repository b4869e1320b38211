use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{
    read_json,
    remote::{ResultUploader, UploadOutcome},
    write_json, OfflineError, OfflineResult,
};
use crate::models::quiz_result::QuizResultSubmission;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingResult {
    pub result: QuizResultSubmission,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub uploaded: usize,
    /// Reached the server but were refused; still queued.
    pub rejected: usize,
    /// Stopped by a transport failure; still queued.
    pub failed: usize,
    pub remaining: usize,
}

/// File-backed FIFO of finished quizzes awaiting upload. An item leaves the
/// queue only after the server accepted it.
#[derive(Debug)]
pub struct SyncQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SyncQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns false when a result with the same id is already queued.
    pub async fn enqueue(&self, result: QuizResultSubmission) -> OfflineResult<bool> {
        let id = result
            .id
            .clone()
            .ok_or_else(|| OfflineError::InvalidKey("<missing result id>".to_string()))?;

        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        if items.iter().any(|p| p.result.id.as_deref() == Some(id.as_str())) {
            tracing::debug!(result_id = %id, "Result already queued");
            return Ok(false);
        }

        items.push(PendingResult {
            result,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        });
        write_json(&self.path, &items).await?;
        tracing::info!(result_id = %id, pending = items.len(), "Queued quiz result");
        Ok(true)
    }

    pub async fn pending(&self) -> OfflineResult<Vec<PendingResult>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Uploads in queue order. A transport failure ends the drain, since the
    /// rest would fail the same way; a rejection moves on to the next item.
    pub async fn drain(&self, uploader: &dyn ResultUploader) -> OfflineResult<DrainReport> {
        let _guard = self.lock.lock().await;
        let items = self.load().await?;
        let mut report = DrainReport::default();
        let mut kept = Vec::with_capacity(items.len());
        let mut offline = false;

        for mut item in items {
            if offline {
                kept.push(item);
                continue;
            }

            item.attempts += 1;
            match uploader.upload(&item.result).await {
                Ok(UploadOutcome::Accepted { created }) => {
                    tracing::info!(
                        result_id = ?item.result.id,
                        created,
                        "Quiz result synced"
                    );
                    report.uploaded += 1;
                }
                Ok(UploadOutcome::Rejected { status, body }) => {
                    tracing::warn!(
                        result_id = ?item.result.id,
                        status,
                        "Quiz result rejected by server"
                    );
                    item.last_error = Some(format!("HTTP {}: {}", status, body));
                    report.rejected += 1;
                    kept.push(item);
                }
                Err(e) => {
                    tracing::warn!(result_id = ?item.result.id, "Sync stopped: {}", e);
                    item.last_error = Some(e.to_string());
                    report.failed += 1;
                    offline = true;
                    kept.push(item);
                }
            }
        }

        report.remaining = kept.len();
        write_json(&self.path, &kept).await?;
        Ok(report)
    }

    async fn load(&self) -> OfflineResult<Vec<PendingResult>> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }
}
