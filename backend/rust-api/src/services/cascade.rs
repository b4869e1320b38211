//! Delete and rename propagation across the hierarchy.
//!
//! Both operations work inside the caller's transaction and leave committing
//! to it. A delete first walks the tree to collect every descendant id, then
//! removes the levels top-down. A rename never deletes children; it rewrites
//! their foreign key.

use chrono::{DateTime, Utc};
use std::slice;

use crate::error::ContentError;
use crate::models::content::{DeleteReport, EntityKind, EntityRecord, RenameReport};
use crate::services::validation::validate_unique;
use crate::store::{ContentTx, StoreError};

/// Everything a delete of `kind`/`id` will remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    pub kind: EntityKind,
    pub id: String,
    pub modules: Vec<String>,
    pub subjects: Vec<String>,
    pub lectures: Vec<String>,
}

impl CascadePlan {
    fn new(kind: EntityKind, id: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            modules: Vec::new(),
            subjects: Vec::new(),
            lectures: Vec::new(),
        }
    }

    fn level_mut(&mut self, kind: EntityKind) -> Option<&mut Vec<String>> {
        match kind {
            EntityKind::Module => Some(&mut self.modules),
            EntityKind::Subject => Some(&mut self.subjects),
            EntityKind::Lecture => Some(&mut self.lectures),
            EntityKind::Year | EntityKind::Question | EntityKind::QuizResult => None,
        }
    }

    /// Walks down from the root one level at a time.
    pub async fn collect(
        tx: &mut dyn ContentTx,
        kind: EntityKind,
        id: &str,
    ) -> Result<Self, ContentError> {
        if matches!(kind, EntityKind::Question | EntityKind::QuizResult) {
            return Err(ContentError::InvalidField {
                kind,
                field: "kind".to_string(),
                reason: format!("{} is not part of the cascade hierarchy", kind),
            });
        }
        if !tx.exists(kind, id).await? {
            return Err(ContentError::not_found(kind, id));
        }

        let mut plan = CascadePlan::new(kind, id);
        let mut level_kind = kind;
        let mut level_ids = vec![id.to_string()];

        while let Some((child_kind, _)) = level_kind.child() {
            if level_ids.is_empty() {
                break;
            }
            let children = tx.child_ids(level_kind, &level_ids).await?;
            if let Some(level) = plan.level_mut(child_kind) {
                level.extend(children.iter().cloned());
            }
            level_kind = child_kind;
            level_ids = children;
        }

        Ok(plan)
    }

    pub fn descendant_count(&self) -> usize {
        self.modules.len() + self.subjects.len() + self.lectures.len()
    }

    pub async fn apply(&self, tx: &mut dyn ContentTx) -> Result<DeleteReport, ContentError> {
        let mut report = DeleteReport {
            kind: Some(self.kind),
            id: self.id.clone(),
            ..DeleteReport::default()
        };

        let removed = tx.delete_many(self.kind, slice::from_ref(&self.id)).await?;
        if removed == 0 {
            return Err(ContentError::not_found(self.kind, &self.id));
        }
        *report_slot(&mut report, self.kind) += removed;

        for (kind, ids) in [
            (EntityKind::Module, &self.modules),
            (EntityKind::Subject, &self.subjects),
            (EntityKind::Lecture, &self.lectures),
        ] {
            if ids.is_empty() {
                continue;
            }
            *report_slot(&mut report, kind) += tx.delete_many(kind, ids).await?;
        }

        Ok(report)
    }
}

fn report_slot(report: &mut DeleteReport, kind: EntityKind) -> &mut u64 {
    match kind {
        EntityKind::Year => &mut report.years,
        EntityKind::Module => &mut report.modules,
        EntityKind::Subject => &mut report.subjects,
        EntityKind::Lecture | EntityKind::Question | EntityKind::QuizResult => {
            &mut report.lectures
        }
    }
}

pub async fn cascade_delete(
    tx: &mut dyn ContentTx,
    kind: EntityKind,
    id: &str,
) -> Result<DeleteReport, ContentError> {
    let plan = CascadePlan::collect(tx, kind, id).await?;
    tracing::debug!(
        kind = %kind,
        id,
        descendants = plan.descendant_count(),
        "Cascade delete planned"
    );
    plan.apply(tx).await
}

/// Moves `record` to `new_id` and repoints its direct children.
///
/// `record` is the current record with any other field changes already
/// applied; it is stored under the new id with `updated_at`.
pub async fn cascade_rename(
    tx: &mut dyn ContentTx,
    mut record: EntityRecord,
    new_id: &str,
    updated_at: DateTime<Utc>,
) -> Result<RenameReport, ContentError> {
    let kind = record.kind();
    let old_id = record.id().to_string();

    validate_unique(tx, kind, new_id).await?;

    record.set_id(new_id);
    record.set_updated_at(updated_at);
    tx.insert(&record).await.map_err(|err| match err {
        StoreError::DuplicateKey { .. } => ContentError::DuplicateId {
            kind,
            id: new_id.to_string(),
        },
        other => other.into(),
    })?;

    let children_repointed = if kind.child().is_some() {
        tx.repoint_children(kind, &old_id, new_id, updated_at)
            .await?
    } else {
        0
    };

    let removed = tx.delete_many(kind, slice::from_ref(&old_id)).await?;
    if removed == 0 {
        return Err(ContentError::not_found(kind, old_id));
    }

    Ok(RenameReport {
        kind,
        old_id,
        new_id: new_id.to_string(),
        children_repointed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::{
        LectureFilter, LectureRecord, ModuleRecord, SubjectRecord, YearRecord,
    };
    use crate::store::{memory::FaultPoint, ContentStore, MemoryContentStore};
    use crate::utils::time::{next_updated_at, now_millis};

    async fn seed(tx: &mut dyn ContentTx, records: Vec<EntityRecord>) {
        for record in records {
            tx.insert(&record).await.unwrap();
        }
    }

    fn year(id: &str) -> EntityRecord {
        let now = now_millis();
        EntityRecord::Year(YearRecord {
            id: id.into(),
            name: id.into(),
            icon: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn module(id: &str, year_id: &str) -> EntityRecord {
        let now = now_millis();
        EntityRecord::Module(ModuleRecord {
            id: id.into(),
            year_id: year_id.into(),
            name: id.into(),
            created_at: now,
            updated_at: now,
        })
    }

    fn subject(id: &str, module_id: &str) -> EntityRecord {
        let now = now_millis();
        EntityRecord::Subject(SubjectRecord {
            id: id.into(),
            module_id: module_id.into(),
            name: id.into(),
            created_at: now,
            updated_at: now,
        })
    }

    fn lecture(id: &str, subject_id: Option<&str>) -> EntityRecord {
        let now = now_millis();
        EntityRecord::Lecture(LectureRecord {
            id: id.into(),
            subject_id: subject_id.map(str::to_string),
            title: id.into(),
            questions: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Y1 > M1 > {S1 > {L1, L2}, S2 > L3}, Y2 > M2 > S3 > L4, plus loose L5.
    async fn seeded_store() -> MemoryContentStore {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();
        seed(
            &mut *tx,
            vec![
                year("Y1"),
                year("Y2"),
                module("M1", "Y1"),
                module("M2", "Y2"),
                subject("S1", "M1"),
                subject("S2", "M1"),
                subject("S3", "M2"),
                lecture("L1", Some("S1")),
                lecture("L2", Some("S1")),
                lecture("L3", Some("S2")),
                lecture("L4", Some("S3")),
                lecture("L5", None),
            ],
        )
        .await;
        tx.commit().await.unwrap();
        drop(tx);
        store
    }

    #[tokio::test]
    async fn year_plan_covers_the_whole_subtree() {
        let store = seeded_store().await;
        let mut tx = store.begin().await.unwrap();

        let plan = CascadePlan::collect(&mut *tx, EntityKind::Year, "Y1")
            .await
            .unwrap();
        assert_eq!(plan.modules, vec!["M1"]);
        assert_eq!(plan.subjects, vec!["S1", "S2"]);
        assert_eq!(plan.lectures, vec!["L1", "L2", "L3"]);
        assert_eq!(plan.descendant_count(), 6);
    }

    #[tokio::test]
    async fn year_delete_removes_exactly_its_subtree() {
        let store = seeded_store().await;
        let mut tx = store.begin().await.unwrap();

        let report = cascade_delete(&mut *tx, EntityKind::Year, "Y1").await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        assert_eq!(
            (report.years, report.modules, report.subjects, report.lectures),
            (1, 1, 2, 3)
        );
        assert_eq!(store.counts().await, (1, 1, 1, 2));
    }

    #[tokio::test]
    async fn subject_delete_spares_sibling_lectures() {
        let store = seeded_store().await;
        let mut tx = store.begin().await.unwrap();

        let report = cascade_delete(&mut *tx, EntityKind::Subject, "S1")
            .await
            .unwrap();
        assert_eq!(report.lectures, 2);

        let remaining: Vec<String> = tx
            .list_lectures(LectureFilter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(remaining, vec!["L3", "L4", "L5"]);
    }

    #[tokio::test]
    async fn lecture_delete_has_no_cascade() {
        let store = seeded_store().await;
        let mut tx = store.begin().await.unwrap();

        let report = cascade_delete(&mut *tx, EntityKind::Lecture, "L5")
            .await
            .unwrap();
        assert_eq!(report.total(), 1);
        assert_eq!(report.lectures, 1);
    }

    #[tokio::test]
    async fn deleting_missing_entity_is_not_found() {
        let store = seeded_store().await;
        let mut tx = store.begin().await.unwrap();

        let err = cascade_delete(&mut *tx, EntityKind::Module, "nope")
            .await
            .unwrap_err();
        assert_eq!(err, ContentError::not_found(EntityKind::Module, "nope"));
    }

    #[tokio::test]
    async fn failure_mid_cascade_leaves_nothing_behind() {
        let store = seeded_store().await;
        store.fail_once(
            FaultPoint::Delete(EntityKind::Lecture),
            StoreError::Backend("crash".into()),
        );

        {
            let mut tx = store.begin().await.unwrap();
            let err = cascade_delete(&mut *tx, EntityKind::Year, "Y1").await;
            assert!(err.is_err());
            tx.abort().await.unwrap();
        }

        assert_eq!(store.counts().await, (2, 2, 3, 5));
    }

    #[tokio::test]
    async fn module_rename_repoints_subjects() {
        let store = seeded_store().await;
        let mut tx = store.begin().await.unwrap();

        let current = tx.fetch(EntityKind::Module, "M1").await.unwrap().unwrap();
        let created_at = current.created_at();
        let stamp = next_updated_at(current.updated_at());
        let report = cascade_rename(&mut *tx, current, "M1-renamed", stamp)
            .await
            .unwrap();
        assert_eq!(report.children_repointed, 2);

        assert!(!tx.exists(EntityKind::Module, "M1").await.unwrap());
        let renamed = tx
            .fetch(EntityKind::Module, "M1-renamed")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.created_at(), created_at);

        let subjects = tx.list_subjects(Some("M1-renamed")).await.unwrap();
        assert_eq!(subjects.len(), 2);
        assert!(subjects.iter().all(|s| s.updated_at >= stamp));
        assert_eq!(tx.list_lectures(LectureFilter::All).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn rename_onto_existing_id_changes_nothing() {
        let store = seeded_store().await;
        let mut tx = store.begin().await.unwrap();

        let current = tx.fetch(EntityKind::Subject, "S1").await.unwrap().unwrap();
        let err = cascade_rename(&mut *tx, current, "S2", now_millis())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ContentError::DuplicateId {
                kind: EntityKind::Subject,
                id: "S2".into()
            }
        );
        assert_eq!(
            tx.list_lectures(LectureFilter::Subject("S1"))
                .await
                .unwrap()
                .len(),
            2
        );
    }
}
