use std::collections::HashMap;

use crate::{
    error::ContentError,
    models::content::{
        LectureFilter, LectureSummary, ModuleNode, ModuleRecord, QuizLectureView, SubjectNode,
        SubjectRecord, YearNode, YearRecord,
    },
    services::{
        content_service::{fetch_lecture, fetch_subject},
        transaction::TransactionRunner,
        AppState,
    },
};

/// Read side used by the browsing and quiz clients. Every call reads one
/// snapshot, so a tree never shows part of an in-flight cascade.
pub struct HierarchyService {
    runner: TransactionRunner,
}

impl HierarchyService {
    pub fn new(state: &AppState) -> Self {
        Self {
            runner: TransactionRunner::new(state.store.clone(), &state.config),
        }
    }

    /// Years > modules > subjects, with a lecture count per subject instead
    /// of lecture bodies.
    pub async fn get_hierarchy(&self) -> Result<Vec<YearNode>, ContentError> {
        let (years, modules, subjects, counts) = self
            .runner
            .read("hierarchy", |tx| {
                Box::pin(async move {
                    let years = tx.list_years().await?;
                    let modules = tx.list_modules(None).await?;
                    let subjects = tx.list_subjects(None).await?;
                    let counts = tx.lecture_counts().await?;
                    Ok((years, modules, subjects, counts))
                })
            })
            .await?;

        Ok(assemble_tree(years, modules, subjects, &counts))
    }

    /// Quiz-facing lecture. The view type has no answer field.
    pub async fn get_lecture_for_quiz(&self, id: &str) -> Result<QuizLectureView, ContentError> {
        let id = id.to_string();
        let record = self
            .runner
            .read("quiz_lecture", |tx| {
                let id = id.clone();
                Box::pin(async move { fetch_lecture(tx, &id).await })
            })
            .await?;
        Ok(QuizLectureView::from(&record))
    }

    pub async fn list_subject_lectures(
        &self,
        subject_id: &str,
    ) -> Result<Vec<LectureSummary>, ContentError> {
        let subject_id = subject_id.to_string();
        let lectures = self
            .runner
            .read("subject_lectures", |tx| {
                let subject_id = subject_id.clone();
                Box::pin(async move {
                    fetch_subject(tx, &subject_id).await?;
                    Ok(tx.list_lectures(LectureFilter::Subject(&subject_id)).await?)
                })
            })
            .await?;
        Ok(lectures.iter().map(LectureSummary::from).collect())
    }
}

/// Builds the tree from flat, already ordered lists. Children keep the order
/// they arrive in.
pub fn assemble_tree(
    years: Vec<YearRecord>,
    modules: Vec<ModuleRecord>,
    subjects: Vec<SubjectRecord>,
    lecture_counts: &HashMap<String, u64>,
) -> Vec<YearNode> {
    let mut subjects_by_module: HashMap<String, Vec<SubjectNode>> = HashMap::new();
    for subject in subjects {
        let lecture_count = lecture_counts.get(&subject.id).copied().unwrap_or(0);
        subjects_by_module
            .entry(subject.module_id)
            .or_default()
            .push(SubjectNode {
                id: subject.id,
                name: subject.name,
                lecture_count,
            });
    }

    let mut modules_by_year: HashMap<String, Vec<ModuleNode>> = HashMap::new();
    for module in modules {
        let subjects = subjects_by_module.remove(&module.id).unwrap_or_default();
        modules_by_year
            .entry(module.year_id)
            .or_default()
            .push(ModuleNode {
                id: module.id,
                name: module.name,
                subjects,
            });
    }

    years
        .into_iter()
        .map(|year| YearNode {
            modules: modules_by_year.remove(&year.id).unwrap_or_default(),
            id: year.id,
            name: year.name,
            icon: year.icon,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::now_millis;

    #[test]
    fn tree_nests_levels_and_counts_lectures() {
        let now = now_millis();
        let years = vec![
            YearRecord {
                id: "Y1".into(),
                name: "Year 1".into(),
                icon: "🩺".into(),
                created_at: now,
                updated_at: now,
            },
            YearRecord {
                id: "Y2".into(),
                name: "Year 2".into(),
                icon: String::new(),
                created_at: now,
                updated_at: now,
            },
        ];
        let modules = vec![ModuleRecord {
            id: "M1".into(),
            year_id: "Y1".into(),
            name: "Cardiology".into(),
            created_at: now,
            updated_at: now,
        }];
        let subjects = vec![
            SubjectRecord {
                id: "S1".into(),
                module_id: "M1".into(),
                name: "Anatomy".into(),
                created_at: now,
                updated_at: now,
            },
            SubjectRecord {
                id: "S2".into(),
                module_id: "M1".into(),
                name: "Physiology".into(),
                created_at: now,
                updated_at: now,
            },
        ];
        let counts = HashMap::from([("S1".to_string(), 3u64)]);

        let tree = assemble_tree(years, modules, subjects, &counts);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].modules.len(), 1);
        let subjects = &tree[0].modules[0].subjects;
        assert_eq!(
            subjects
                .iter()
                .map(|s| (s.id.as_str(), s.lecture_count))
                .collect::<Vec<_>>(),
            vec![("S1", 3), ("S2", 0)]
        );
        assert!(tree[1].modules.is_empty());
    }

    #[test]
    fn tree_json_has_no_lecture_bodies() {
        let tree = assemble_tree(Vec::new(), Vec::new(), Vec::new(), &HashMap::new());
        assert!(tree.is_empty());

        let node = SubjectNode {
            id: "S1".into(),
            name: "Anatomy".into(),
            lecture_count: 2,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["lectureCount"], 2);
        assert!(json.get("lectures").is_none());
    }
}
