use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{read_json, remove_file, write_json, OfflineError, OfflineResult};
use crate::models::{content::QuizLectureView, quiz_result::QuizResultSubmission};
use crate::services::validation::is_valid_id;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    pub selected: usize,
    pub correct: bool,
}

/// In-flight quiz for one lecture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizProgress {
    pub lecture_id: String,
    pub current_index: usize,
    pub score: u32,
    pub answers: Vec<AnswerRecord>,
    pub updated_at: DateTime<Utc>,
}

impl QuizProgress {
    pub fn new(lecture_id: &str) -> Self {
        Self {
            lecture_id: lecture_id.to_string(),
            current_index: 0,
            score: 0,
            answers: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Answering the same question again replaces the earlier answer.
    pub fn record(&mut self, answer: AnswerRecord) {
        match self
            .answers
            .iter_mut()
            .find(|a| a.question_id == answer.question_id)
        {
            Some(existing) => *existing = answer,
            None => self.answers.push(answer),
        }
        self.current_index = self.answers.len();
        self.score = self.answers.iter().filter(|a| a.correct).count() as u32;
        self.updated_at = Utc::now();
    }
}

/// On-disk state of the offline client:
///
/// ```text
/// <root>/lectures/<lectureId>.json   last fetched quiz payload
/// <root>/progress/<lectureId>.json   in-flight quiz
/// <root>/history.json                every finished quiz, synced or not
/// ```
#[derive(Debug, Clone)]
pub struct ProgressStore {
    root: PathBuf,
}

impl ProgressStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn load(&self, lecture_id: &str) -> OfflineResult<Option<QuizProgress>> {
        read_json(&self.keyed_path("progress", lecture_id)?).await
    }

    pub async fn save(&self, progress: &QuizProgress) -> OfflineResult<()> {
        write_json(&self.keyed_path("progress", &progress.lecture_id)?, progress).await
    }

    pub async fn clear(&self, lecture_id: &str) -> OfflineResult<()> {
        remove_file(&self.keyed_path("progress", lecture_id)?).await
    }

    pub async fn load_lecture(&self, lecture_id: &str) -> OfflineResult<Option<QuizLectureView>> {
        read_json(&self.keyed_path("lectures", lecture_id)?).await
    }

    pub async fn save_lecture(&self, lecture: &QuizLectureView) -> OfflineResult<()> {
        write_json(&self.keyed_path("lectures", &lecture.id)?, lecture).await
    }

    pub async fn history(&self) -> OfflineResult<Vec<QuizResultSubmission>> {
        Ok(read_json(&self.history_path()).await?.unwrap_or_default())
    }

    pub async fn append_history(&self, result: &QuizResultSubmission) -> OfflineResult<()> {
        let mut history = self.history().await?;
        if history.iter().any(|r| r.id == result.id) {
            return Ok(());
        }
        history.push(result.clone());
        write_json(&self.history_path(), &history).await
    }

    fn history_path(&self) -> PathBuf {
        self.root.join("history.json")
    }

    // Keys become file names, so they must be plain ids
    fn keyed_path(&self, dir: &str, key: &str) -> OfflineResult<PathBuf> {
        if !is_valid_id(key) {
            return Err(OfflineError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(dir).join(format!("{}.json", key)))
    }
}
