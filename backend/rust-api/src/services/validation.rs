//! Rules checked before anything is written.
//!
//! The pure checks (`validate_required`, `validate_id_format`,
//! `validate_question`) need no store. Reference and uniqueness checks read
//! through the caller's transaction so they see the same snapshot the write
//! will be applied to.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::error::ContentError;
use crate::models::content::{EntityKind, Question, QuestionInput};
use crate::store::ContentTx;

lazy_static! {
    static ref ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").unwrap();
}

pub const MIN_OPTIONS: usize = 2;

pub fn is_valid_id(id: &str) -> bool {
    ID_REGEX.is_match(id)
}

/// Trimmed value of a required string field, or `MissingField` when it is
/// absent or blank.
pub fn validate_required(
    kind: EntityKind,
    field: &str,
    value: Option<&str>,
    id: Option<&str>,
) -> Result<String, ContentError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ContentError::MissingField {
            kind,
            field: field.to_string(),
            id: id.map(str::to_string),
        }),
    }
}

/// Admin-chosen id: required, trimmed, and limited to a URL-safe alphabet.
pub fn validate_id_format(kind: EntityKind, value: Option<&str>) -> Result<String, ContentError> {
    let id = validate_required(kind, "id", value, None)?;
    if !is_valid_id(&id) {
        return Err(ContentError::InvalidField {
            kind,
            field: "id".to_string(),
            reason: format!(
                "'{}' must start with a letter or digit and contain only letters, digits, '_', '-' or '.' (max 64 characters)",
                id
            ),
        });
    }
    Ok(id)
}

fn invalid_question(question_id: &str, field: &str, reason: impl Into<String>) -> ContentError {
    ContentError::InvalidQuestion {
        question_id: question_id.to_string(),
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// `correctAnswer` arrives as raw JSON; `1` and `1.0` are both integers.
fn answer_index(value: &serde_json::Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i32::MAX as f64)
        .map(|f| f as i64)
}

pub fn validate_question(input: &QuestionInput) -> Result<Question, ContentError> {
    let id = validate_id_format(EntityKind::Question, input.id.as_deref())?;

    let text = match input.text.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => return Err(invalid_question(&id, "text", "text must not be empty")),
    };

    if input.options.len() < MIN_OPTIONS {
        return Err(invalid_question(
            &id,
            "options",
            format!(
                "at least {} options are required, got {}",
                MIN_OPTIONS,
                input.options.len()
            ),
        ));
    }

    if input.options.iter().any(|o| o.trim().is_empty()) {
        return Err(invalid_question(&id, "options", "options must not be blank"));
    }

    let mut seen = HashSet::with_capacity(input.options.len());
    for option in &input.options {
        if !seen.insert(option.as_str()) {
            return Err(invalid_question(
                &id,
                "options",
                format!("option '{}' appears more than once", option),
            ));
        }
    }

    let index = answer_index(&input.correct_answer).ok_or_else(|| {
        invalid_question(&id, "correctAnswer", "correctAnswer must be an integer")
    })?;
    if index < 0 || index >= input.options.len() as i64 {
        return Err(invalid_question(
            &id,
            "correctAnswer",
            format!(
                "correctAnswer {} is out of range for {} options",
                index,
                input.options.len()
            ),
        ));
    }

    Ok(Question {
        id,
        text,
        options: input.options.clone(),
        correct_answer: index as i32,
    })
}

/// Validates every question and rejects repeated question ids.
pub fn validate_questions(inputs: &[QuestionInput]) -> Result<Vec<Question>, ContentError> {
    let mut questions: Vec<Question> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let question = validate_question(input)?;
        ensure_question_id_free(&questions, &question.id)?;
        questions.push(question);
    }
    Ok(questions)
}

pub fn ensure_question_id_free(existing: &[Question], id: &str) -> Result<(), ContentError> {
    if existing.iter().any(|q| q.id == id) {
        return Err(ContentError::DuplicateId {
            kind: EntityKind::Question,
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Checks that `parent_id` names an existing parent of `kind`.
///
/// Lectures are the only kind whose reference is optional; `None` passes for
/// them and is a `MissingField` for modules and subjects.
///
/// Hierarchy parents are locked, not just read: under snapshot isolation a
/// read alone would not conflict with a cascade deleting or renaming the
/// parent, and the child would be committed as an orphan. Quiz results only
/// read their lecture, since no cascade reaches them.
pub async fn validate_reference(
    tx: &mut dyn ContentTx,
    kind: EntityKind,
    parent_id: Option<&str>,
) -> Result<(), ContentError> {
    let Some((parent_kind, field)) = kind.parent() else {
        return Ok(());
    };

    let parent_id = match parent_id {
        Some(id) => id,
        None if kind == EntityKind::Lecture => return Ok(()),
        None => return Err(ContentError::missing_field(kind, field)),
    };

    let present = if kind == EntityKind::QuizResult {
        tx.exists(parent_kind, parent_id).await?
    } else {
        tx.lock(parent_kind, parent_id).await?
    };
    if present {
        Ok(())
    } else {
        Err(ContentError::MissingParent {
            kind,
            field: field.to_string(),
            parent_kind,
            parent_id: parent_id.to_string(),
        })
    }
}

pub async fn validate_unique(
    tx: &mut dyn ContentTx,
    kind: EntityKind,
    id: &str,
) -> Result<(), ContentError> {
    if tx.exists(kind, id).await? {
        return Err(ContentError::DuplicateId {
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::{EntityRecord, YearRecord};
    use crate::store::{ContentStore, MemoryContentStore};
    use crate::utils::time::now_millis;
    use serde_json::json;

    fn question(id: &str, options: &[&str], correct: serde_json::Value) -> QuestionInput {
        QuestionInput {
            id: Some(id.to_string()),
            text: Some("Which one?".to_string()),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_answer: correct,
        }
    }

    #[test]
    fn repeated_options_are_rejected() {
        let err = validate_question(&question("q1", &["A", "A"], json!(0))).unwrap_err();
        assert!(matches!(
            err,
            ContentError::InvalidQuestion { ref field, .. } if field == "options"
        ));
    }

    #[test]
    fn answer_index_must_be_in_range() {
        let err = validate_question(&question("q1", &["A", "B"], json!(2))).unwrap_err();
        assert_eq!(err.field(), Some("correctAnswer"));
        assert_eq!(err.offending_id(), Some("q1"));

        let err = validate_question(&question("q1", &["A", "B"], json!(-1))).unwrap_err();
        assert_eq!(err.field(), Some("correctAnswer"));
    }

    #[test]
    fn well_formed_question_is_accepted() {
        let q = validate_question(&question("q1", &["A", "B"], json!(1))).unwrap();
        assert_eq!(q.correct_answer, 1);
        assert_eq!(q.options, vec!["A", "B"]);
    }

    #[test]
    fn non_integer_answers_are_rejected() {
        for bad in [json!("1"), json!(0.5), json!(null), json!(true)] {
            let err = validate_question(&question("q1", &["A", "B"], bad)).unwrap_err();
            assert_eq!(err.field(), Some("correctAnswer"));
        }
        assert!(validate_question(&question("q1", &["A", "B"], json!(1.0))).is_ok());
    }

    #[test]
    fn single_option_and_blank_text_are_rejected() {
        let err = validate_question(&question("q1", &["A"], json!(0))).unwrap_err();
        assert_eq!(err.field(), Some("options"));

        let mut blank = question("q1", &["A", "B"], json!(0));
        blank.text = Some("   ".into());
        assert_eq!(validate_question(&blank).unwrap_err().field(), Some("text"));
    }

    #[test]
    fn duplicate_question_ids_conflict() {
        let inputs = vec![
            question("q1", &["A", "B"], json!(0)),
            question("q1", &["C", "D"], json!(1)),
        ];
        let err = validate_questions(&inputs).unwrap_err();
        assert_eq!(
            err,
            ContentError::DuplicateId {
                kind: EntityKind::Question,
                id: "q1".into()
            }
        );
    }

    #[test]
    fn required_fields_are_trimmed() {
        assert_eq!(
            validate_required(EntityKind::Year, "name", Some("  Year 1 "), None).unwrap(),
            "Year 1"
        );
        let err = validate_required(EntityKind::Module, "name", Some(" "), Some("M1")).unwrap_err();
        assert_eq!(err.field(), Some("name"));
        assert_eq!(err.offending_id(), Some("M1"));
        assert!(validate_required(EntityKind::Lecture, "title", None, None).is_err());
    }

    #[test]
    fn id_format_is_enforced() {
        assert_eq!(
            validate_id_format(EntityKind::Module, Some(" M1-renamed ")).unwrap(),
            "M1-renamed"
        );
        assert!(matches!(
            validate_id_format(EntityKind::Module, Some("bad id")),
            Err(ContentError::InvalidField { .. })
        ));
        assert!(matches!(
            validate_id_format(EntityKind::Module, Some("-leading")),
            Err(ContentError::InvalidField { .. })
        ));
        assert!(matches!(
            validate_id_format(EntityKind::Module, None),
            Err(ContentError::MissingField { .. })
        ));
    }

    #[tokio::test]
    async fn references_and_uniqueness_read_the_transaction() {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();
        let now = now_millis();
        tx.insert(&EntityRecord::Year(YearRecord {
            id: "Y1".into(),
            name: "Year 1".into(),
            icon: String::new(),
            created_at: now,
            updated_at: now,
        }))
        .await
        .unwrap();

        assert!(validate_reference(&mut *tx, EntityKind::Module, Some("Y1"))
            .await
            .is_ok());
        let err = validate_reference(&mut *tx, EntityKind::Module, Some("Y9"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "ReferenceError");
        assert_eq!(err.offending_id(), Some("Y9"));

        assert!(validate_reference(&mut *tx, EntityKind::Lecture, None)
            .await
            .is_ok());
        assert!(matches!(
            validate_reference(&mut *tx, EntityKind::Subject, None).await,
            Err(ContentError::MissingField { .. })
        ));

        assert!(matches!(
            validate_unique(&mut *tx, EntityKind::Year, "Y1").await,
            Err(ContentError::DuplicateId { .. })
        ));
        assert!(validate_unique(&mut *tx, EntityKind::Module, "Y1").await.is_ok());
    }

    #[tokio::test]
    async fn parent_references_take_a_lock() {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();

        let _ = validate_reference(&mut *tx, EntityKind::Module, Some("Y1")).await;
        let _ = validate_reference(&mut *tx, EntityKind::Lecture, Some("S1")).await;
        let _ = validate_reference(&mut *tx, EntityKind::QuizResult, Some("L1")).await;

        assert_eq!(
            store.locked(),
            vec![
                (EntityKind::Year, "Y1".to_string()),
                (EntityKind::Subject, "S1".to_string()),
            ]
        );
    }
}
