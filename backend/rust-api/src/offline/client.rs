use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    cache::KeyedCache,
    progress::{AnswerRecord, ProgressStore, QuizProgress},
    remote::{LectureSource, ResultUploader},
    sync_queue::{DrainReport, SyncQueue},
    OfflineError, OfflineResult,
};
use crate::models::{content::QuizLectureView, quiz_result::QuizResultSubmission};

const STATS_KEY: &str = "overall";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizStats {
    pub quizzes_completed: usize,
    pub average_percent: f64,
    /// Consecutive days with a finished quiz, ending today or yesterday.
    pub current_streak: u32,
}

/// Quiz-taking front end that keeps working without a connection.
pub struct QuizClient {
    source: Arc<dyn LectureSource>,
    uploader: Arc<dyn ResultUploader>,
    store: ProgressStore,
    queue: SyncQueue,
    lectures: KeyedCache<String, QuizLectureView>,
    stats: KeyedCache<&'static str, QuizStats>,
}

impl QuizClient {
    /// Offline state lives under `data_dir`.
    pub fn new(
        source: Arc<dyn LectureSource>,
        uploader: Arc<dyn ResultUploader>,
        data_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        let store = ProgressStore::new(data_dir);
        let queue = SyncQueue::new(store.root().join("sync_queue.json"));
        Self {
            source,
            uploader,
            store,
            queue,
            lectures: KeyedCache::new(),
            stats: KeyedCache::new(),
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Fresh copy when the server answers, otherwise the last cached one.
    pub async fn fetch_lecture(&self, lecture_id: &str) -> OfflineResult<QuizLectureView> {
        match self.source.fetch_lecture(lecture_id).await {
            Ok(lecture) => {
                self.lectures.put(lecture_id.to_string(), lecture.clone());
                if let Err(e) = self.store.save_lecture(&lecture).await {
                    tracing::warn!(lecture_id, "Failed to keep offline copy: {}", e);
                }
                Ok(lecture)
            }
            Err(e) => {
                tracing::warn!(lecture_id, "Lecture fetch failed, trying offline copy: {}", e);
                if let Some(lecture) = self.lectures.get(&lecture_id.to_string()) {
                    return Ok(lecture);
                }
                match self.store.load_lecture(lecture_id).await {
                    Ok(Some(lecture)) => {
                        self.lectures.put(lecture_id.to_string(), lecture.clone());
                        Ok(lecture)
                    }
                    Ok(None) => Err(OfflineError::ContentUnavailable {
                        lecture_id: lecture_id.to_string(),
                    }),
                    Err(load_err) => {
                        tracing::warn!(lecture_id, "Offline copy unreadable: {}", load_err);
                        Err(OfflineError::ContentUnavailable {
                            lecture_id: lecture_id.to_string(),
                        })
                    }
                }
            }
        }
    }

    pub async fn progress(&self, lecture_id: &str) -> OfflineResult<Option<QuizProgress>> {
        self.store.load(lecture_id).await
    }

    pub async fn record_answer(
        &self,
        lecture_id: &str,
        answer: AnswerRecord,
    ) -> OfflineResult<QuizProgress> {
        let mut progress = self
            .store
            .load(lecture_id)
            .await?
            .unwrap_or_else(|| QuizProgress::new(lecture_id));
        progress.record(answer);
        self.store.save(&progress).await?;
        Ok(progress)
    }

    /// Turns the lecture's progress into a result, queues it for upload and
    /// clears the progress.
    pub async fn finish_quiz(
        &self,
        lecture_id: &str,
        total: u32,
    ) -> OfflineResult<QuizResultSubmission> {
        let progress = self
            .store
            .load(lecture_id)
            .await?
            .unwrap_or_else(|| QuizProgress::new(lecture_id));

        let result = QuizResultSubmission {
            id: Some(uuid::Uuid::new_v4().to_string()),
            lecture_id: Some(lecture_id.to_string()),
            score: progress.score.min(total),
            total,
            completed_at: Some(Utc::now()),
        };

        self.queue.enqueue(result.clone()).await?;
        self.store.append_history(&result).await?;
        self.store.clear(lecture_id).await?;
        self.stats.invalidate(&STATS_KEY);

        tracing::info!(
            lecture_id,
            score = result.score,
            total,
            "Quiz finished"
        );
        Ok(result)
    }

    pub async fn sync(&self) -> OfflineResult<DrainReport> {
        self.queue.drain(self.uploader.as_ref()).await
    }

    pub async fn stats(&self) -> OfflineResult<QuizStats> {
        if let Some(stats) = self.stats.get(&STATS_KEY) {
            return Ok(stats);
        }
        let history = self.store.history().await?;
        let stats = compute_stats(&history, Utc::now().date_naive());
        self.stats.put(STATS_KEY, stats.clone());
        Ok(stats)
    }

    pub fn invalidate_stats(&self) {
        self.stats.invalidate(&STATS_KEY);
    }
}

pub fn compute_stats(history: &[QuizResultSubmission], today: NaiveDate) -> QuizStats {
    if history.is_empty() {
        return QuizStats::default();
    }

    let percent_sum: f64 = history
        .iter()
        .map(|r| {
            if r.total == 0 {
                0.0
            } else {
                f64::from(r.score) * 100.0 / f64::from(r.total)
            }
        })
        .sum();

    let days: BTreeSet<NaiveDate> = history
        .iter()
        .filter_map(|r| r.completed_at)
        .map(|at| at.date_naive())
        .collect();

    let mut day = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut streak = 0;
    while days.contains(&day) {
        streak += 1;
        day -= Duration::days(1);
    }

    QuizStats {
        quizzes_completed: history.len(),
        average_percent: percent_sum / history.len() as f64,
        current_streak: streak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::QuizQuestion;
    use crate::offline::remote::{RemoteError, UploadOutcome};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakySource {
        online: AtomicBool,
    }

    #[async_trait]
    impl LectureSource for FlakySource {
        async fn fetch_lecture(&self, lecture_id: &str) -> Result<QuizLectureView, RemoteError> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(RemoteError::Transport("offline".to_string()));
            }
            Ok(QuizLectureView {
                id: lecture_id.to_string(),
                subject_id: Some("S1".to_string()),
                title: "Cardiology basics".to_string(),
                questions: vec![QuizQuestion {
                    id: "q1".to_string(),
                    text: "Normal resting heart rate?".to_string(),
                    options: vec!["60-100".to_string(), "120-160".to_string()],
                }],
                updated_at: Utc::now(),
            })
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl ResultUploader for AcceptAll {
        async fn upload(&self, _: &QuizResultSubmission) -> Result<UploadOutcome, RemoteError> {
            Ok(UploadOutcome::Accepted { created: true })
        }
    }

    fn client(dir: &std::path::Path, online: bool) -> (QuizClient, Arc<FlakySource>) {
        let source = Arc::new(FlakySource {
            online: AtomicBool::new(online),
        });
        let client = QuizClient::new(source.clone(), Arc::new(AcceptAll), dir);
        (client, source)
    }

    fn finished(day: u32, score: u32, total: u32) -> QuizResultSubmission {
        QuizResultSubmission {
            id: Some(format!("r-{}-{}", day, score)),
            lecture_id: Some("L1".to_string()),
            score,
            total,
            completed_at: Some(Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn falls_back_to_offline_copy() {
        let dir = tempfile::tempdir().unwrap();
        let (online_client, _) = client(dir.path(), true);
        let fetched = online_client.fetch_lecture("L1").await.unwrap();

        // New process, no memory cache, no network
        let (offline_client, _) = client(dir.path(), false);
        let cached = offline_client.fetch_lecture("L1").await.unwrap();
        assert_eq!(cached, fetched);
    }

    #[tokio::test]
    async fn unknown_lecture_offline_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = client(dir.path(), false);

        let err = client.fetch_lecture("L9").await.unwrap_err();
        assert!(matches!(err, OfflineError::ContentUnavailable { lecture_id } if lecture_id == "L9"));
    }

    #[tokio::test]
    async fn finishing_queues_result_and_refreshes_stats() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = client(dir.path(), false);

        assert_eq!(client.stats().await.unwrap().quizzes_completed, 0);

        client
            .record_answer(
                "L1",
                AnswerRecord {
                    question_id: "q1".to_string(),
                    selected: 0,
                    correct: true,
                },
            )
            .await
            .unwrap();
        let result = client.finish_quiz("L1", 2).await.unwrap();

        assert_eq!(result.score, 1);
        assert!(client.progress("L1").await.unwrap().is_none());
        assert_eq!(client.queue().pending().await.unwrap().len(), 1);

        let stats = client.stats().await.unwrap();
        assert_eq!(stats.quizzes_completed, 1);
        assert_eq!(stats.average_percent, 50.0);
        assert_eq!(stats.current_streak, 1);

        let report = client.sync().await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert!(client.queue().pending().await.unwrap().is_empty());
    }

    #[test]
    fn streak_counts_consecutive_days() {
        let history = vec![finished(1, 1, 2), finished(3, 2, 2), finished(4, 0, 2), finished(5, 2, 2)];
        let today = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();

        let stats = compute_stats(&history, today);
        assert_eq!(stats.quizzes_completed, 4);
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.average_percent, 62.5);
    }

    #[test]
    fn streak_survives_until_end_of_next_day() {
        let history = vec![finished(4, 1, 1), finished(5, 1, 1)];

        let tomorrow = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();
        assert_eq!(compute_stats(&history, tomorrow).current_streak, 2);

        let later = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(compute_stats(&history, later).current_streak, 0);
    }
}
