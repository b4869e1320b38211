//! In-process content store.
//!
//! A transaction holds the store lock for its whole lifetime and writes to a
//! private copy of the state. Commit swaps the copy in; abort or drop throws it
//! away. Writers are therefore fully serialised and readers never see a
//! half-applied cascade.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ContentStore, ContentTx, StoreError, StoreResult};
use crate::models::{
    content::{
        EntityKind, EntityRecord, LectureFilter, LectureRecord, ModuleRecord, SubjectRecord,
        YearRecord,
    },
    quiz_result::QuizResultRecord,
};
use crate::utils::time::advance;

#[derive(Debug, Clone, Default)]
struct ContentState {
    years: Vec<YearRecord>,
    modules: Vec<ModuleRecord>,
    subjects: Vec<SubjectRecord>,
    lectures: Vec<LectureRecord>,
    results: Vec<QuizResultRecord>,
}

/// Store operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Lock(EntityKind),
    Insert(EntityKind),
    Replace(EntityKind),
    Delete(EntityKind),
    Repoint(EntityKind),
    Commit,
}

#[derive(Debug, Default)]
struct Hooks {
    pending: Vec<(FaultPoint, StoreError)>,
    op_delay: Option<Duration>,
    locks: Vec<(EntityKind, String)>,
}

#[derive(Clone, Default)]
pub struct MemoryContentStore {
    state: Arc<Mutex<ContentState>>,
    hooks: Arc<StdMutex<Hooks>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next operation matching `point` fails with `error`, once.
    pub fn fail_once(&self, point: FaultPoint, error: StoreError) {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.pending.push((point, error));
        }
    }

    /// Every store operation sleeps this long first. `None` disables it.
    pub fn set_op_delay(&self, delay: Option<Duration>) {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.op_delay = delay;
        }
    }

    /// Every `(kind, id)` locked so far, committed or not, in call order.
    pub fn locked(&self) -> Vec<(EntityKind, String)> {
        self.hooks
            .lock()
            .map(|hooks| hooks.locks.clone())
            .unwrap_or_default()
    }

    pub fn clear_locked(&self) {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.locks.clear();
        }
    }

    pub async fn counts(&self) -> (usize, usize, usize, usize) {
        let state = self.state.lock().await;
        (
            state.years.len(),
            state.modules.len(),
            state.subjects.len(),
            state.lectures.len(),
        )
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn begin(&self) -> StoreResult<Box<dyn ContentTx + '_>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            hooks: self.hooks.clone(),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<ContentState>,
    working: ContentState,
    hooks: Arc<StdMutex<Hooks>>,
}

impl MemoryTx {
    async fn checkpoint(&self, point: Option<FaultPoint>) -> StoreResult<()> {
        let (delay, fault) = {
            let mut hooks = self
                .hooks
                .lock()
                .map_err(|_| StoreError::Backend("store hooks poisoned".to_string()))?;
            let fault = point.and_then(|point| {
                hooks
                    .pending
                    .iter()
                    .position(|(p, _)| *p == point)
                    .map(|idx| hooks.pending.remove(idx).1)
            });
            (hooks.op_delay, fault)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn by_creation<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> (DateTime<Utc>, &str),
{
    items.sort_by(|a, b| key(a).cmp(&key(b)));
}

fn duplicate(kind: EntityKind, id: &str) -> StoreError {
    StoreError::DuplicateKey {
        collection: kind.collection().to_string(),
        message: format!("_id '{}' already exists", id),
    }
}

#[async_trait]
impl ContentTx for MemoryTx {
    async fn fetch(&mut self, kind: EntityKind, id: &str) -> StoreResult<Option<EntityRecord>> {
        self.checkpoint(None).await?;
        let state = &self.working;
        let record = match kind {
            EntityKind::Year => state
                .years
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .map(EntityRecord::Year),
            EntityKind::Module => state
                .modules
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .map(EntityRecord::Module),
            EntityKind::Subject => state
                .subjects
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .map(EntityRecord::Subject),
            EntityKind::Lecture => state
                .lectures
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .map(EntityRecord::Lecture),
            EntityKind::Question | EntityKind::QuizResult => None,
        };
        Ok(record)
    }

    async fn lock(&mut self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        self.checkpoint(Some(FaultPoint::Lock(kind))).await?;
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.locks.push((kind, id.to_string()));
        }
        // The store lock already serialises transactions
        let state = &self.working;
        let present = match kind {
            EntityKind::Year => state.years.iter().any(|r| r.id == id),
            EntityKind::Module => state.modules.iter().any(|r| r.id == id),
            EntityKind::Subject => state.subjects.iter().any(|r| r.id == id),
            EntityKind::Lecture => state.lectures.iter().any(|r| r.id == id),
            EntityKind::Question | EntityKind::QuizResult => false,
        };
        Ok(present)
    }

    async fn child_ids(
        &mut self,
        parent_kind: EntityKind,
        parent_ids: &[String],
    ) -> StoreResult<Vec<String>> {
        self.checkpoint(None).await?;
        let state = &self.working;
        let is_parent = |id: &str| parent_ids.iter().any(|p| p == id);
        let ids = match parent_kind {
            EntityKind::Year => state
                .modules
                .iter()
                .filter(|m| is_parent(&m.year_id))
                .map(|m| m.id.clone())
                .collect(),
            EntityKind::Module => state
                .subjects
                .iter()
                .filter(|s| is_parent(&s.module_id))
                .map(|s| s.id.clone())
                .collect(),
            EntityKind::Subject => state
                .lectures
                .iter()
                .filter(|l| l.subject_id.as_deref().is_some_and(is_parent))
                .map(|l| l.id.clone())
                .collect(),
            EntityKind::Lecture | EntityKind::Question | EntityKind::QuizResult => Vec::new(),
        };
        Ok(ids)
    }

    async fn insert(&mut self, record: &EntityRecord) -> StoreResult<()> {
        self.checkpoint(Some(FaultPoint::Insert(record.kind())))
            .await?;
        let state = &mut self.working;
        match record {
            EntityRecord::Year(r) => {
                if state.years.iter().any(|y| y.id == r.id) {
                    return Err(duplicate(EntityKind::Year, &r.id));
                }
                state.years.push(r.clone());
            }
            EntityRecord::Module(r) => {
                if state.modules.iter().any(|m| m.id == r.id) {
                    return Err(duplicate(EntityKind::Module, &r.id));
                }
                state.modules.push(r.clone());
            }
            EntityRecord::Subject(r) => {
                if state.subjects.iter().any(|s| s.id == r.id) {
                    return Err(duplicate(EntityKind::Subject, &r.id));
                }
                state.subjects.push(r.clone());
            }
            EntityRecord::Lecture(r) => {
                if state.lectures.iter().any(|l| l.id == r.id) {
                    return Err(duplicate(EntityKind::Lecture, &r.id));
                }
                state.lectures.push(r.clone());
            }
        }
        Ok(())
    }

    async fn replace(&mut self, record: &EntityRecord) -> StoreResult<bool> {
        self.checkpoint(Some(FaultPoint::Replace(record.kind())))
            .await?;
        let state = &mut self.working;
        let slot = match record {
            EntityRecord::Year(r) => state
                .years
                .iter_mut()
                .find(|y| y.id == r.id)
                .map(|slot| *slot = r.clone()),
            EntityRecord::Module(r) => state
                .modules
                .iter_mut()
                .find(|m| m.id == r.id)
                .map(|slot| *slot = r.clone()),
            EntityRecord::Subject(r) => state
                .subjects
                .iter_mut()
                .find(|s| s.id == r.id)
                .map(|slot| *slot = r.clone()),
            EntityRecord::Lecture(r) => state
                .lectures
                .iter_mut()
                .find(|l| l.id == r.id)
                .map(|slot| *slot = r.clone()),
        };
        Ok(slot.is_some())
    }

    async fn delete_many(&mut self, kind: EntityKind, ids: &[String]) -> StoreResult<u64> {
        self.checkpoint(Some(FaultPoint::Delete(kind))).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let state = &mut self.working;
        let doomed = |id: &str| ids.iter().any(|d| d == id);
        let removed = match kind {
            EntityKind::Year => {
                let before = state.years.len();
                state.years.retain(|r| !doomed(&r.id));
                before - state.years.len()
            }
            EntityKind::Module => {
                let before = state.modules.len();
                state.modules.retain(|r| !doomed(&r.id));
                before - state.modules.len()
            }
            EntityKind::Subject => {
                let before = state.subjects.len();
                state.subjects.retain(|r| !doomed(&r.id));
                before - state.subjects.len()
            }
            EntityKind::Lecture => {
                let before = state.lectures.len();
                state.lectures.retain(|r| !doomed(&r.id));
                before - state.lectures.len()
            }
            EntityKind::Question | EntityKind::QuizResult => 0,
        };
        Ok(removed as u64)
    }

    async fn repoint_children(
        &mut self,
        parent_kind: EntityKind,
        old_id: &str,
        new_id: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.checkpoint(Some(FaultPoint::Repoint(parent_kind)))
            .await?;
        let state = &mut self.working;
        let mut touched = 0u64;
        match parent_kind {
            EntityKind::Year => {
                for child in state.modules.iter_mut().filter(|m| m.year_id == old_id) {
                    child.year_id = new_id.to_string();
                    child.updated_at = advance(child.updated_at, updated_at);
                    touched += 1;
                }
            }
            EntityKind::Module => {
                for child in state.subjects.iter_mut().filter(|s| s.module_id == old_id) {
                    child.module_id = new_id.to_string();
                    child.updated_at = advance(child.updated_at, updated_at);
                    touched += 1;
                }
            }
            EntityKind::Subject => {
                for child in state
                    .lectures
                    .iter_mut()
                    .filter(|l| l.subject_id.as_deref() == Some(old_id))
                {
                    child.subject_id = Some(new_id.to_string());
                    child.updated_at = advance(child.updated_at, updated_at);
                    touched += 1;
                }
            }
            EntityKind::Lecture | EntityKind::Question | EntityKind::QuizResult => {}
        }
        Ok(touched)
    }

    async fn list_years(&mut self) -> StoreResult<Vec<YearRecord>> {
        self.checkpoint(None).await?;
        let mut years = self.working.years.clone();
        by_creation(&mut years, |r| (r.created_at, r.id.as_str()));
        Ok(years)
    }

    async fn list_modules(&mut self, year_id: Option<&str>) -> StoreResult<Vec<ModuleRecord>> {
        self.checkpoint(None).await?;
        let mut modules: Vec<ModuleRecord> = self
            .working
            .modules
            .iter()
            .filter(|m| year_id.is_none_or(|y| m.year_id == y))
            .cloned()
            .collect();
        by_creation(&mut modules, |r| (r.created_at, r.id.as_str()));
        Ok(modules)
    }

    async fn list_subjects(&mut self, module_id: Option<&str>) -> StoreResult<Vec<SubjectRecord>> {
        self.checkpoint(None).await?;
        let mut subjects: Vec<SubjectRecord> = self
            .working
            .subjects
            .iter()
            .filter(|s| module_id.is_none_or(|m| s.module_id == m))
            .cloned()
            .collect();
        by_creation(&mut subjects, |r| (r.created_at, r.id.as_str()));
        Ok(subjects)
    }

    async fn list_lectures(
        &mut self,
        filter: LectureFilter<'_>,
    ) -> StoreResult<Vec<LectureRecord>> {
        self.checkpoint(None).await?;
        let mut lectures: Vec<LectureRecord> = self
            .working
            .lectures
            .iter()
            .filter(|l| match filter {
                LectureFilter::All => true,
                LectureFilter::Subject(subject_id) => l.subject_id.as_deref() == Some(subject_id),
                LectureFilter::Unassigned => l.subject_id.is_none(),
            })
            .cloned()
            .collect();
        by_creation(&mut lectures, |r| (r.created_at, r.id.as_str()));
        Ok(lectures)
    }

    async fn lecture_counts(&mut self) -> StoreResult<HashMap<String, u64>> {
        self.checkpoint(None).await?;
        let mut counts = HashMap::new();
        for subject_id in self
            .working
            .lectures
            .iter()
            .filter_map(|l| l.subject_id.as_ref())
        {
            *counts.entry(subject_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn get_result(&mut self, id: &str) -> StoreResult<Option<QuizResultRecord>> {
        self.checkpoint(None).await?;
        Ok(self.working.results.iter().find(|r| r.id == id).cloned())
    }

    async fn upsert_result(&mut self, result: &QuizResultRecord) -> StoreResult<bool> {
        self.checkpoint(None).await?;
        match self.working.results.iter_mut().find(|r| r.id == result.id) {
            Some(slot) => {
                *slot = result.clone();
                Ok(false)
            }
            None => {
                self.working.results.push(result.clone());
                Ok(true)
            }
        }
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.checkpoint(Some(FaultPoint::Commit)).await?;
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn abort(&mut self) -> StoreResult<()> {
        self.working = self.guard.clone();
        Ok(())
    }
}
