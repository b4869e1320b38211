//! MongoDB content store.
//!
//! The admin-chosen id is the document `_id`, so uniqueness is enforced by the
//! primary index. Every unit of work runs in a multi-document transaction with
//! snapshot reads and majority writes, which needs a replica set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{Acknowledgment, ReadConcern, TransactionOptions, WriteConcern},
    ClientSession, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;

use super::{ContentStore, ContentTx, StoreError, StoreResult};
use crate::metrics::track_db_operation;
use crate::models::{
    content::{
        EntityKind, EntityRecord, LectureFilter, LectureRecord, ModuleRecord, SubjectRecord,
        YearRecord, LECTURES_COLLECTION, MODULES_COLLECTION, SUBJECTS_COLLECTION,
        YEARS_COLLECTION,
    },
    quiz_result::{QuizResultRecord, QUIZ_RESULTS_COLLECTION},
};
use crate::utils::time::chrono_to_bson;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Counter bumped by [`ContentTx::lock`]. Not part of any record model.
const LOCK_FIELD: &str = "lockRev";

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        if err.contains_label(TRANSIENT_TRANSACTION_ERROR)
            || err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
        {
            return StoreError::Transient(err.to_string());
        }
        match *err.kind {
            ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == DUPLICATE_KEY_CODE => {
                StoreError::DuplicateKey {
                    collection: String::new(),
                    message: we.message.clone(),
                }
            }
            ErrorKind::Command(ref ce) if ce.code == DUPLICATE_KEY_CODE => {
                StoreError::DuplicateKey {
                    collection: String::new(),
                    message: ce.message.clone(),
                }
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

pub struct MongoContentStore {
    client: mongodb::Client,
    db: Database,
}

impl MongoContentStore {
    pub fn new(client: mongodb::Client, database: &str) -> Self {
        let db = client.database(database);
        Self { client, db }
    }

    /// Secondary indexes on every foreign key. `_id` is indexed already.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let specs = [
            (MODULES_COLLECTION, "yearId"),
            (SUBJECTS_COLLECTION, "moduleId"),
            (LECTURES_COLLECTION, "subjectId"),
            (QUIZ_RESULTS_COLLECTION, "lectureId"),
        ];
        for (collection, field) in specs {
            self.db
                .collection::<Document>(collection)
                .create_index(IndexModel::builder().keys(doc! { field: 1 }).build())
                .await?;
            tracing::debug!("Index ensured on {}.{}", collection, field);
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MongoContentStore {
    async fn begin(&self) -> StoreResult<Box<dyn ContentTx + '_>> {
        let mut session = self.client.start_session().await?;
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction().with_options(options).await?;
        Ok(Box::new(MongoTx {
            db: self.db.clone(),
            session,
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}

pub struct MongoTx {
    db: Database,
    session: ClientSession,
}

impl MongoTx {
    fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection::<T>(name)
    }

    async fn find_one_as<T>(&mut self, collection: &str, id: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let coll = self.collection::<T>(collection);
        let found = coll
            .find_one(doc! { "_id": id })
            .session(&mut self.session)
            .await?;
        Ok(found)
    }

    async fn find_sorted<T>(&mut self, collection: &str, filter: Document) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let coll = self.collection::<T>(collection);
        let mut cursor = coll
            .find(filter)
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .session(&mut self.session)
            .await?;
        let items = cursor.stream(&mut self.session).try_collect().await?;
        Ok(items)
    }

    async fn insert_as<T>(&mut self, collection: &str, record: &T) -> StoreResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let coll = self.collection::<T>(collection);
        coll.insert_one(record)
            .session(&mut self.session)
            .await
            .map_err(|e| with_collection(e.into(), collection))?;
        Ok(())
    }

    async fn replace_as<T>(&mut self, collection: &str, id: &str, record: &T) -> StoreResult<bool>
    where
        T: Serialize + Send + Sync,
    {
        let coll = self.collection::<T>(collection);
        let result = coll
            .replace_one(doc! { "_id": id }, record)
            .session(&mut self.session)
            .await?;
        Ok(result.matched_count > 0)
    }
}

fn with_collection(err: StoreError, collection: &str) -> StoreError {
    match err {
        StoreError::DuplicateKey { message, .. } => StoreError::DuplicateKey {
            collection: collection.to_string(),
            message,
        },
        other => other,
    }
}

fn lock_update() -> Document {
    doc! { "$inc": { LOCK_FIELD: 1 } }
}

/// Pipeline that moves children to `new_id` and advances their `updatedAt`
/// to `stamp`, or one millisecond past their own value when that is not older.
fn repoint_update(field: &str, new_id: &str, stamp: DateTime<Utc>) -> Vec<Document> {
    let stamp = chrono_to_bson(stamp);
    vec![doc! {
        "$set": {
            field: { "$literal": new_id },
            "updatedAt": {
                "$cond": [
                    { "$gt": [stamp, "$updatedAt"] },
                    stamp,
                    { "$add": ["$updatedAt", 1] },
                ]
            },
        }
    }]
}

fn count_from(doc: &Document) -> u64 {
    match doc.get("count") {
        Some(Bson::Int32(n)) => *n as u64,
        Some(Bson::Int64(n)) => *n as u64,
        _ => 0,
    }
}

#[async_trait]
impl ContentTx for MongoTx {
    async fn fetch(&mut self, kind: EntityKind, id: &str) -> StoreResult<Option<EntityRecord>> {
        let record = match kind {
            EntityKind::Year => self
                .find_one_as::<YearRecord>(YEARS_COLLECTION, id)
                .await?
                .map(EntityRecord::Year),
            EntityKind::Module => self
                .find_one_as::<ModuleRecord>(MODULES_COLLECTION, id)
                .await?
                .map(EntityRecord::Module),
            EntityKind::Subject => self
                .find_one_as::<SubjectRecord>(SUBJECTS_COLLECTION, id)
                .await?
                .map(EntityRecord::Subject),
            EntityKind::Lecture => self
                .find_one_as::<LectureRecord>(LECTURES_COLLECTION, id)
                .await?
                .map(EntityRecord::Lecture),
            EntityKind::Question | EntityKind::QuizResult => None,
        };
        Ok(record)
    }

    async fn exists(&mut self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        if matches!(kind, EntityKind::Question | EntityKind::QuizResult) {
            return Ok(false);
        }
        let coll = self.collection::<Document>(kind.collection());
        let count = coll
            .count_documents(doc! { "_id": id })
            .session(&mut self.session)
            .await?;
        Ok(count > 0)
    }

    async fn lock(&mut self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        if matches!(kind, EntityKind::Question | EntityKind::QuizResult) {
            return Ok(false);
        }
        let collection = kind.collection();
        let coll = self.collection::<Document>(collection);
        let session = &mut self.session;
        let fut = async move {
            let result = coll
                .update_one(doc! { "_id": id }, lock_update())
                .session(session)
                .await?;
            Ok(result.matched_count > 0)
        };
        track_db_operation("lock", collection, fut).await
    }

    async fn child_ids(
        &mut self,
        parent_kind: EntityKind,
        parent_ids: &[String],
    ) -> StoreResult<Vec<String>> {
        let Some((child_kind, field)) = parent_kind.child() else {
            return Ok(Vec::new());
        };
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let coll = self.collection::<Document>(child_kind.collection());
        let mut cursor = coll
            .find(doc! { field: { "$in": parent_ids } })
            .projection(doc! { "_id": 1 })
            .session(&mut self.session)
            .await?;
        let docs: Vec<Document> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(docs
            .iter()
            .filter_map(|d| d.get_str("_id").ok().map(str::to_string))
            .collect())
    }

    async fn insert(&mut self, record: &EntityRecord) -> StoreResult<()> {
        let collection = record.kind().collection();
        let fut = async {
            match record {
                EntityRecord::Year(r) => self.insert_as(collection, r).await,
                EntityRecord::Module(r) => self.insert_as(collection, r).await,
                EntityRecord::Subject(r) => self.insert_as(collection, r).await,
                EntityRecord::Lecture(r) => self.insert_as(collection, r).await,
            }
        };
        track_db_operation("insert", collection, fut).await
    }

    async fn replace(&mut self, record: &EntityRecord) -> StoreResult<bool> {
        let collection = record.kind().collection();
        let id = record.id().to_string();
        let fut = async {
            match record {
                EntityRecord::Year(r) => self.replace_as(collection, &id, r).await,
                EntityRecord::Module(r) => self.replace_as(collection, &id, r).await,
                EntityRecord::Subject(r) => self.replace_as(collection, &id, r).await,
                EntityRecord::Lecture(r) => self.replace_as(collection, &id, r).await,
            }
        };
        track_db_operation("replace", collection, fut).await
    }

    async fn delete_many(&mut self, kind: EntityKind, ids: &[String]) -> StoreResult<u64> {
        if ids.is_empty() || matches!(kind, EntityKind::Question | EntityKind::QuizResult) {
            return Ok(0);
        }
        let collection = kind.collection();
        let coll = self.collection::<Document>(collection);
        let session = &mut self.session;
        let fut = async move {
            let result = coll
                .delete_many(doc! { "_id": { "$in": ids } })
                .session(session)
                .await?;
            Ok(result.deleted_count)
        };
        track_db_operation("delete_many", collection, fut).await
    }

    async fn repoint_children(
        &mut self,
        parent_kind: EntityKind,
        old_id: &str,
        new_id: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let Some((child_kind, field)) = parent_kind.child() else {
            return Ok(0);
        };
        let collection = child_kind.collection();
        let coll = self.collection::<Document>(collection);
        let session = &mut self.session;
        let fut = async move {
            let result = coll
                .update_many(doc! { field: old_id }, repoint_update(field, new_id, updated_at))
                .session(session)
                .await?;
            Ok(result.modified_count)
        };
        track_db_operation("repoint", collection, fut).await
    }

    async fn list_years(&mut self) -> StoreResult<Vec<YearRecord>> {
        self.find_sorted(YEARS_COLLECTION, Document::new()).await
    }

    async fn list_modules(&mut self, year_id: Option<&str>) -> StoreResult<Vec<ModuleRecord>> {
        let filter = match year_id {
            Some(year_id) => doc! { "yearId": year_id },
            None => Document::new(),
        };
        self.find_sorted(MODULES_COLLECTION, filter).await
    }

    async fn list_subjects(&mut self, module_id: Option<&str>) -> StoreResult<Vec<SubjectRecord>> {
        let filter = match module_id {
            Some(module_id) => doc! { "moduleId": module_id },
            None => Document::new(),
        };
        self.find_sorted(SUBJECTS_COLLECTION, filter).await
    }

    async fn list_lectures(
        &mut self,
        filter: LectureFilter<'_>,
    ) -> StoreResult<Vec<LectureRecord>> {
        let filter = match filter {
            LectureFilter::All => Document::new(),
            LectureFilter::Subject(subject_id) => doc! { "subjectId": subject_id },
            LectureFilter::Unassigned => doc! { "subjectId": Bson::Null },
        };
        self.find_sorted(LECTURES_COLLECTION, filter).await
    }

    async fn lecture_counts(&mut self) -> StoreResult<HashMap<String, u64>> {
        let coll = self.collection::<Document>(LECTURES_COLLECTION);
        let pipeline = vec![
            doc! { "$match": { "subjectId": { "$ne": Bson::Null } } },
            doc! { "$group": { "_id": "$subjectId", "count": { "$sum": 1 } } },
        ];
        let mut cursor = coll
            .aggregate(pipeline)
            .session(&mut self.session)
            .await?;
        let groups: Vec<Document> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(groups
            .iter()
            .filter_map(|g| {
                g.get_str("_id")
                    .ok()
                    .map(|subject_id| (subject_id.to_string(), count_from(g)))
            })
            .collect())
    }

    async fn get_result(&mut self, id: &str) -> StoreResult<Option<QuizResultRecord>> {
        self.find_one_as(QUIZ_RESULTS_COLLECTION, id).await
    }

    async fn upsert_result(&mut self, result: &QuizResultRecord) -> StoreResult<bool> {
        let coll = self.collection::<QuizResultRecord>(QUIZ_RESULTS_COLLECTION);
        let outcome = coll
            .replace_one(doc! { "_id": result.id.as_str() }, result)
            .upsert(true)
            .session(&mut self.session)
            .await?;
        Ok(outcome.upserted_id.is_some())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.session.commit_transaction().await?;
        Ok(())
    }

    async fn abort(&mut self) -> StoreResult<()> {
        self.session.abort_transaction().await?;
        Ok(())
    }
}
