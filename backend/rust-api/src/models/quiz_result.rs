use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

pub const QUIZ_RESULTS_COLLECTION: &str = "quiz_results";

/// Finished quiz stored in MongoDB "quiz_results". The id is chosen by the
/// client so replays of the same submission overwrite instead of duplicating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub lecture_id: String,
    pub score: u32,
    pub total: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub received_at: DateTime<Utc>,
}

/// Payload posted by the offline sync queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultSubmission {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub lecture_id: Option<String>,
    pub score: u32,
    pub total: u32,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultView {
    pub id: String,
    pub lecture_id: String,
    pub score: u32,
    pub total: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    /// False when this submission replaced an earlier one with the same id.
    pub created: bool,
}

impl QuizResultView {
    pub fn from_record(record: QuizResultRecord, created: bool) -> Self {
        Self {
            id: record.id,
            lecture_id: record.lecture_id,
            score: record.score,
            total: record.total,
            completed_at: record.completed_at,
            received_at: record.received_at,
            created,
        }
    }
}
