//! Storage seam for the content hierarchy.
//!
//! Every unit of work, read or write, runs inside one [`ContentTx`]. A
//! transaction either commits all of its writes or none of them; dropping a
//! transaction without committing discards it.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{
    content::{
        EntityKind, EntityRecord, LectureFilter, LectureRecord, ModuleRecord, SubjectRecord,
        YearRecord,
    },
    quiz_result::QuizResultRecord,
};

pub use memory::MemoryContentStore;
pub use mongo::MongoContentStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Unique index violation on insert.
    #[error("Duplicate key in {collection}: {message}")]
    DuplicateKey { collection: String, message: String },

    /// Write conflict or similar; the whole transaction may be retried.
    #[error("Transient store failure: {0}")]
    Transient(String),

    #[error("Store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Opens a transaction. Reads inside it see one consistent snapshot.
    async fn begin(&self) -> StoreResult<Box<dyn ContentTx + '_>>;

    async fn ping(&self) -> StoreResult<()>;

    fn backend(&self) -> &'static str;
}

#[async_trait]
pub trait ContentTx: Send {
    async fn fetch(&mut self, kind: EntityKind, id: &str) -> StoreResult<Option<EntityRecord>>;

    async fn exists(&mut self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        Ok(self.fetch(kind, id).await?.is_some())
    }

    /// Writes to the record without changing its content, so that a concurrent
    /// transaction deleting or renaming it conflicts with this one. Returns
    /// false when the record does not exist.
    async fn lock(&mut self, kind: EntityKind, id: &str) -> StoreResult<bool>;

    /// Ids of the direct children of any of `parent_ids`.
    async fn child_ids(
        &mut self,
        parent_kind: EntityKind,
        parent_ids: &[String],
    ) -> StoreResult<Vec<String>>;

    /// Fails with [`StoreError::DuplicateKey`] when the id is taken.
    async fn insert(&mut self, record: &EntityRecord) -> StoreResult<()>;

    /// Replaces the record with the same kind and id. Returns false if absent.
    async fn replace(&mut self, record: &EntityRecord) -> StoreResult<bool>;

    async fn delete_many(&mut self, kind: EntityKind, ids: &[String]) -> StoreResult<u64>;

    /// Rewrites the foreign key of every direct child of `old_id` to `new_id`.
    async fn repoint_children(
        &mut self,
        parent_kind: EntityKind,
        old_id: &str,
        new_id: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn list_years(&mut self) -> StoreResult<Vec<YearRecord>>;

    async fn list_modules(&mut self, year_id: Option<&str>) -> StoreResult<Vec<ModuleRecord>>;

    async fn list_subjects(&mut self, module_id: Option<&str>) -> StoreResult<Vec<SubjectRecord>>;

    async fn list_lectures(&mut self, filter: LectureFilter<'_>)
        -> StoreResult<Vec<LectureRecord>>;

    /// Lecture count per subject id, without loading lecture bodies.
    async fn lecture_counts(&mut self) -> StoreResult<HashMap<String, u64>>;

    async fn get_result(&mut self, id: &str) -> StoreResult<Option<QuizResultRecord>>;

    /// Insert-or-replace by id. Returns true when the id was new.
    async fn upsert_result(&mut self, result: &QuizResultRecord) -> StoreResult<bool>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn abort(&mut self) -> StoreResult<()>;
}
