use crate::{
    error::ContentError,
    metrics::QUIZ_RESULTS_TOTAL,
    models::{
        content::EntityKind,
        quiz_result::{QuizResultRecord, QuizResultSubmission, QuizResultView},
    },
    services::{
        transaction::TransactionRunner,
        validation::{validate_id_format, validate_reference, validate_required},
        AppState,
    },
    utils::time::now_millis,
};

/// Receives finished quizzes from the offline sync queue.
pub struct ResultService {
    runner: TransactionRunner,
}

impl ResultService {
    pub fn new(state: &AppState) -> Self {
        Self {
            runner: TransactionRunner::new(state.store.clone(), &state.config),
        }
    }

    /// Insert-or-replace by the client-chosen id, so a replayed upload never
    /// creates a second result. The first `receivedAt` is kept.
    pub async fn submit_result(
        &self,
        submission: QuizResultSubmission,
        user_id: Option<String>,
    ) -> Result<QuizResultView, ContentError> {
        let id = validate_id_format(EntityKind::QuizResult, submission.id.as_deref())?;
        let lecture_id = validate_required(
            EntityKind::QuizResult,
            "lectureId",
            submission.lecture_id.as_deref(),
            Some(&id),
        )?;
        if submission.score > submission.total {
            return Err(ContentError::InvalidField {
                kind: EntityKind::QuizResult,
                field: "score".to_string(),
                reason: format!(
                    "score {} is greater than total {}",
                    submission.score, submission.total
                ),
            });
        }

        let draft = QuizResultRecord {
            id,
            lecture_id,
            score: submission.score,
            total: submission.total,
            user_id,
            completed_at: submission.completed_at,
            received_at: now_millis(),
        };

        let (record, created) = self
            .runner
            .write(EntityKind::QuizResult, "submit", |tx| {
                let mut record = draft.clone();
                Box::pin(async move {
                    validate_reference(tx, EntityKind::QuizResult, Some(&record.lecture_id))
                        .await?;
                    if let Some(previous) = tx.get_result(&record.id).await? {
                        record.received_at = previous.received_at;
                    }
                    let created = tx.upsert_result(&record).await?;
                    Ok((record, created))
                })
            })
            .await?;

        let outcome = if created { "created" } else { "replayed" };
        QUIZ_RESULTS_TOTAL.with_label_values(&[outcome]).inc();
        tracing::info!(
            id = %record.id,
            lecture_id = %record.lecture_id,
            score = record.score,
            total = record.total,
            outcome,
            "Quiz result stored"
        );

        Ok(QuizResultView::from_record(record, created))
    }
}
