use crate::{
    error::ContentError,
    metrics,
    models::content::{
        AdminLectureView, DeleteReport, EntityKind, EntityRecord, LectureCreateRequest,
        LectureFilter, LectureListQuery, LectureRecord, LectureUpdateRequest, ModuleCreateRequest,
        ModuleListQuery, ModuleRecord, ModuleUpdateRequest, ModuleView, QuestionInput,
        RenameReport, SubjectCreateRequest, SubjectListQuery, SubjectRecord, SubjectUpdateRequest,
        SubjectView, YearCreateRequest, YearRecord, YearUpdateRequest, YearView,
    },
    services::{
        cascade::{cascade_delete, cascade_rename},
        transaction::TransactionRunner,
        validation::{
            ensure_question_id_free, validate_id_format, validate_question, validate_questions,
            validate_reference, validate_required, validate_unique,
        },
        AppState,
    },
    store::{ContentTx, StoreError},
    utils::time::{next_updated_at, now_millis},
};

/// Admin-side create, update, delete and rename of hierarchy content.
///
/// Field rules that need no store are checked before a transaction is
/// opened; references and uniqueness are checked inside it.
pub struct ContentService {
    runner: TransactionRunner,
}

impl ContentService {
    pub fn new(state: &AppState) -> Self {
        Self {
            runner: TransactionRunner::new(state.store.clone(), &state.config),
        }
    }

    // ==================== YEARS ====================

    pub async fn create_year(&self, request: YearCreateRequest) -> Result<YearView, ContentError> {
        let id = validate_id_format(EntityKind::Year, request.id.as_deref())?;
        let name = validate_required(EntityKind::Year, "name", request.name.as_deref(), Some(&id))?;
        let now = now_millis();
        let draft = YearRecord {
            id,
            name,
            icon: trimmed(request.icon.as_deref()).unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let record = self
            .runner
            .write(EntityKind::Year, "create", |tx| {
                let record = draft.clone();
                Box::pin(async move {
                    validate_unique(tx, EntityKind::Year, &record.id).await?;
                    insert_new(tx, EntityRecord::Year(record.clone())).await?;
                    Ok(record)
                })
            })
            .await?;

        tracing::info!(id = %record.id, "Year created");
        Ok(record.into())
    }

    pub async fn update_year(
        &self,
        id: &str,
        request: YearUpdateRequest,
    ) -> Result<YearView, ContentError> {
        let new_id = optional_id(EntityKind::Year, request.id.as_deref())?;
        let name = optional_required(EntityKind::Year, "name", request.name.as_deref(), id)?;
        let icon = trimmed(request.icon.as_deref());
        let id = id.to_string();

        let (record, renamed) = self
            .runner
            .write(EntityKind::Year, "update", |tx| {
                let (id, new_id, name, icon) = (id.clone(), new_id.clone(), name.clone(), icon.clone());
                Box::pin(async move {
                    let mut record = fetch_year(tx, &id).await?;
                    if let Some(name) = name {
                        record.name = name;
                    }
                    if let Some(icon) = icon {
                        record.icon = icon;
                    }
                    record.updated_at = next_updated_at(record.updated_at);

                    let renamed = store_update(
                        tx,
                        &id,
                        EntityRecord::Year(record.clone()),
                        new_id.as_deref(),
                        false,
                    )
                    .await?;
                    if let Some(report) = &renamed {
                        record.id = report.new_id.clone();
                    }
                    Ok((record, renamed))
                })
            })
            .await?;

        log_update(EntityKind::Year, &id, renamed.as_ref());
        Ok(record.into())
    }

    // ==================== MODULES ====================

    pub async fn create_module(
        &self,
        request: ModuleCreateRequest,
    ) -> Result<ModuleView, ContentError> {
        let id = validate_id_format(EntityKind::Module, request.id.as_deref())?;
        let name =
            validate_required(EntityKind::Module, "name", request.name.as_deref(), Some(&id))?;
        let year_id =
            validate_required(EntityKind::Module, "yearId", request.year_id.as_deref(), Some(&id))?;
        let now = now_millis();
        let draft = ModuleRecord {
            id,
            year_id,
            name,
            created_at: now,
            updated_at: now,
        };

        let record = self
            .runner
            .write(EntityKind::Module, "create", |tx| {
                let record = draft.clone();
                Box::pin(async move {
                    validate_unique(tx, EntityKind::Module, &record.id).await?;
                    validate_reference(tx, EntityKind::Module, Some(&record.year_id)).await?;
                    insert_new(tx, EntityRecord::Module(record.clone())).await?;
                    Ok(record)
                })
            })
            .await?;

        tracing::info!(id = %record.id, year_id = %record.year_id, "Module created");
        Ok(record.into())
    }

    pub async fn update_module(
        &self,
        id: &str,
        request: ModuleUpdateRequest,
    ) -> Result<ModuleView, ContentError> {
        let new_id = optional_id(EntityKind::Module, request.id.as_deref())?;
        let name = optional_required(EntityKind::Module, "name", request.name.as_deref(), id)?;
        let year_id =
            optional_required(EntityKind::Module, "yearId", request.year_id.as_deref(), id)?;
        let id = id.to_string();

        let (record, renamed) = self
            .runner
            .write(EntityKind::Module, "update", |tx| {
                let (id, new_id, name, year_id) =
                    (id.clone(), new_id.clone(), name.clone(), year_id.clone());
                Box::pin(async move {
                    let mut record = fetch_module(tx, &id).await?;
                    if let Some(name) = name {
                        record.name = name;
                    }
                    let parent_changed = year_id.as_ref().is_some_and(|y| *y != record.year_id);
                    if let Some(year_id) = year_id {
                        record.year_id = year_id;
                    }
                    record.updated_at = next_updated_at(record.updated_at);

                    let renamed = store_update(
                        tx,
                        &id,
                        EntityRecord::Module(record.clone()),
                        new_id.as_deref(),
                        parent_changed,
                    )
                    .await?;
                    if let Some(report) = &renamed {
                        record.id = report.new_id.clone();
                    }
                    Ok((record, renamed))
                })
            })
            .await?;

        log_update(EntityKind::Module, &id, renamed.as_ref());
        Ok(record.into())
    }

    // ==================== SUBJECTS ====================

    pub async fn create_subject(
        &self,
        request: SubjectCreateRequest,
    ) -> Result<SubjectView, ContentError> {
        let id = validate_id_format(EntityKind::Subject, request.id.as_deref())?;
        let name =
            validate_required(EntityKind::Subject, "name", request.name.as_deref(), Some(&id))?;
        let module_id = validate_required(
            EntityKind::Subject,
            "moduleId",
            request.module_id.as_deref(),
            Some(&id),
        )?;
        let now = now_millis();
        let draft = SubjectRecord {
            id,
            module_id,
            name,
            created_at: now,
            updated_at: now,
        };

        let record = self
            .runner
            .write(EntityKind::Subject, "create", |tx| {
                let record = draft.clone();
                Box::pin(async move {
                    validate_unique(tx, EntityKind::Subject, &record.id).await?;
                    validate_reference(tx, EntityKind::Subject, Some(&record.module_id)).await?;
                    insert_new(tx, EntityRecord::Subject(record.clone())).await?;
                    Ok(record)
                })
            })
            .await?;

        tracing::info!(id = %record.id, module_id = %record.module_id, "Subject created");
        Ok(record.into())
    }

    pub async fn update_subject(
        &self,
        id: &str,
        request: SubjectUpdateRequest,
    ) -> Result<SubjectView, ContentError> {
        let new_id = optional_id(EntityKind::Subject, request.id.as_deref())?;
        let name = optional_required(EntityKind::Subject, "name", request.name.as_deref(), id)?;
        let module_id = optional_required(
            EntityKind::Subject,
            "moduleId",
            request.module_id.as_deref(),
            id,
        )?;
        let id = id.to_string();

        let (record, renamed) = self
            .runner
            .write(EntityKind::Subject, "update", |tx| {
                let (id, new_id, name, module_id) =
                    (id.clone(), new_id.clone(), name.clone(), module_id.clone());
                Box::pin(async move {
                    let mut record = fetch_subject(tx, &id).await?;
                    if let Some(name) = name {
                        record.name = name;
                    }
                    let parent_changed =
                        module_id.as_ref().is_some_and(|m| *m != record.module_id);
                    if let Some(module_id) = module_id {
                        record.module_id = module_id;
                    }
                    record.updated_at = next_updated_at(record.updated_at);

                    let renamed = store_update(
                        tx,
                        &id,
                        EntityRecord::Subject(record.clone()),
                        new_id.as_deref(),
                        parent_changed,
                    )
                    .await?;
                    if let Some(report) = &renamed {
                        record.id = report.new_id.clone();
                    }
                    Ok((record, renamed))
                })
            })
            .await?;

        log_update(EntityKind::Subject, &id, renamed.as_ref());
        Ok(record.into())
    }

    // ==================== LECTURES ====================

    pub async fn create_lecture(
        &self,
        request: LectureCreateRequest,
    ) -> Result<AdminLectureView, ContentError> {
        let id = validate_id_format(EntityKind::Lecture, request.id.as_deref())?;
        let title =
            validate_required(EntityKind::Lecture, "title", request.title.as_deref(), Some(&id))?;
        let questions = validate_questions(&request.questions)?;
        let now = now_millis();
        let draft = LectureRecord {
            id,
            subject_id: trimmed(request.subject_id.as_deref()).filter(|s| !s.is_empty()),
            title,
            questions,
            created_at: now,
            updated_at: now,
        };

        let record = self
            .runner
            .write(EntityKind::Lecture, "create", |tx| {
                let record = draft.clone();
                Box::pin(async move {
                    validate_unique(tx, EntityKind::Lecture, &record.id).await?;
                    validate_reference(tx, EntityKind::Lecture, record.subject_id.as_deref())
                        .await?;
                    insert_new(tx, EntityRecord::Lecture(record.clone())).await?;
                    Ok(record)
                })
            })
            .await?;

        tracing::info!(
            id = %record.id,
            subject_id = ?record.subject_id,
            questions = record.questions.len(),
            "Lecture created"
        );
        Ok(record.into())
    }

    pub async fn update_lecture(
        &self,
        id: &str,
        request: LectureUpdateRequest,
    ) -> Result<AdminLectureView, ContentError> {
        let new_id = optional_id(EntityKind::Lecture, request.id.as_deref())?;
        let title = optional_required(EntityKind::Lecture, "title", request.title.as_deref(), id)?;
        // Some(None) detaches; a blank id counts as detaching too.
        let subject_id: Option<Option<String>> = request
            .subject_id
            .map(|s| trimmed(s.as_deref()).filter(|s| !s.is_empty()));
        let questions = request
            .questions
            .as_deref()
            .map(validate_questions)
            .transpose()?;
        let id = id.to_string();

        let (record, renamed) = self
            .runner
            .write(EntityKind::Lecture, "update", |tx| {
                let (id, new_id, title, subject_id, questions) = (
                    id.clone(),
                    new_id.clone(),
                    title.clone(),
                    subject_id.clone(),
                    questions.clone(),
                );
                Box::pin(async move {
                    let mut record = fetch_lecture(tx, &id).await?;
                    if let Some(title) = title {
                        record.title = title;
                    }
                    if let Some(questions) = questions {
                        record.questions = questions;
                    }
                    let parent_changed = subject_id
                        .as_ref()
                        .is_some_and(|s| *s != record.subject_id);
                    if let Some(subject_id) = subject_id {
                        record.subject_id = subject_id;
                    }
                    record.updated_at = next_updated_at(record.updated_at);

                    let renamed = store_update(
                        tx,
                        &id,
                        EntityRecord::Lecture(record.clone()),
                        new_id.as_deref(),
                        parent_changed,
                    )
                    .await?;
                    if let Some(report) = &renamed {
                        record.id = report.new_id.clone();
                    }
                    Ok((record, renamed))
                })
            })
            .await?;

        log_update(EntityKind::Lecture, &id, renamed.as_ref());
        Ok(record.into())
    }

    /// Appends one question; its id must be new within the lecture.
    pub async fn add_question(
        &self,
        lecture_id: &str,
        input: QuestionInput,
    ) -> Result<AdminLectureView, ContentError> {
        let question = validate_question(&input)?;
        let lecture_id = lecture_id.to_string();

        let record = self
            .runner
            .write(EntityKind::Question, "create", |tx| {
                let (lecture_id, question) = (lecture_id.clone(), question.clone());
                Box::pin(async move {
                    let mut record = fetch_lecture(tx, &lecture_id).await?;
                    ensure_question_id_free(&record.questions, &question.id)?;
                    record.questions.push(question);
                    record.updated_at = next_updated_at(record.updated_at);
                    replace_existing(tx, EntityRecord::Lecture(record.clone())).await?;
                    Ok(record)
                })
            })
            .await?;

        tracing::info!(
            lecture_id = %record.id,
            questions = record.questions.len(),
            "Question added"
        );
        Ok(record.into())
    }

    pub async fn remove_question(
        &self,
        lecture_id: &str,
        question_id: &str,
    ) -> Result<AdminLectureView, ContentError> {
        let (lecture_id, question_id) = (lecture_id.to_string(), question_id.to_string());

        let record = self
            .runner
            .write(EntityKind::Question, "delete", |tx| {
                let (lecture_id, question_id) = (lecture_id.clone(), question_id.clone());
                Box::pin(async move {
                    let mut record = fetch_lecture(tx, &lecture_id).await?;
                    let position = record
                        .questions
                        .iter()
                        .position(|q| q.id == question_id)
                        .ok_or_else(|| ContentError::not_found(EntityKind::Question, &question_id))?;
                    record.questions.remove(position);
                    record.updated_at = next_updated_at(record.updated_at);
                    replace_existing(tx, EntityRecord::Lecture(record.clone())).await?;
                    Ok(record)
                })
            })
            .await?;

        tracing::info!(lecture_id = %record.id, question_id = %question_id, "Question removed");
        Ok(record.into())
    }

    // ==================== CASCADES ====================

    /// Deletes the entity and everything beneath it, or nothing at all.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<DeleteReport, ContentError> {
        let id = id.to_string();

        let report = self
            .runner
            .write(kind, "delete", |tx| {
                let id = id.clone();
                Box::pin(async move { cascade_delete(tx, kind, &id).await })
            })
            .await?;

        for (kind, count) in [
            (EntityKind::Year, report.years),
            (EntityKind::Module, report.modules),
            (EntityKind::Subject, report.subjects),
            (EntityKind::Lecture, report.lectures),
        ] {
            metrics::record_cascade(kind.as_str(), "deleted", count);
        }
        tracing::info!(
            kind = %kind,
            id = %report.id,
            modules = report.modules,
            subjects = report.subjects,
            lectures = report.lectures,
            "Cascade delete committed"
        );
        Ok(report)
    }

    /// Changes an id and repoints the direct children to it.
    pub async fn rename(
        &self,
        kind: EntityKind,
        id: &str,
        new_id: Option<&str>,
    ) -> Result<RenameReport, ContentError> {
        if matches!(kind, EntityKind::Question | EntityKind::QuizResult) {
            return Err(ContentError::InvalidField {
                kind,
                field: "kind".to_string(),
                reason: format!("{} ids cannot be renamed", kind),
            });
        }
        let new_id = validate_id_format(kind, new_id)?;
        let id = id.to_string();

        let report = self
            .runner
            .write(kind, "rename", |tx| {
                let (id, new_id) = (id.clone(), new_id.clone());
                Box::pin(async move {
                    let current = tx
                        .fetch(kind, &id)
                        .await?
                        .ok_or_else(|| ContentError::not_found(kind, &id))?;
                    if new_id == id {
                        return Ok(RenameReport {
                            kind,
                            old_id: id.clone(),
                            new_id,
                            children_repointed: 0,
                        });
                    }
                    let stamp = next_updated_at(current.updated_at());
                    cascade_rename(tx, current, &new_id, stamp).await
                })
            })
            .await?;

        log_update(kind, &id, Some(&report));
        Ok(report)
    }

    // ==================== ADMIN READS ====================

    pub async fn list_years(&self) -> Result<Vec<YearView>, ContentError> {
        let years = self
            .runner
            .read("list_years", |tx| Box::pin(async move { Ok(tx.list_years().await?) }))
            .await?;
        Ok(years.into_iter().map(YearView::from).collect())
    }

    pub async fn get_year(&self, id: &str) -> Result<YearView, ContentError> {
        let id = id.to_string();
        let record = self
            .runner
            .read("get_year", |tx| {
                let id = id.clone();
                Box::pin(async move { fetch_year(tx, &id).await })
            })
            .await?;
        Ok(record.into())
    }

    pub async fn list_modules(&self, query: ModuleListQuery) -> Result<Vec<ModuleView>, ContentError> {
        let year_id = trimmed(query.year_id.as_deref()).filter(|y| !y.is_empty());
        let modules = self
            .runner
            .read("list_modules", |tx| {
                let year_id = year_id.clone();
                Box::pin(async move { Ok(tx.list_modules(year_id.as_deref()).await?) })
            })
            .await?;
        Ok(modules.into_iter().map(ModuleView::from).collect())
    }

    pub async fn get_module(&self, id: &str) -> Result<ModuleView, ContentError> {
        let id = id.to_string();
        let record = self
            .runner
            .read("get_module", |tx| {
                let id = id.clone();
                Box::pin(async move { fetch_module(tx, &id).await })
            })
            .await?;
        Ok(record.into())
    }

    pub async fn list_subjects(
        &self,
        query: SubjectListQuery,
    ) -> Result<Vec<SubjectView>, ContentError> {
        let module_id = trimmed(query.module_id.as_deref()).filter(|m| !m.is_empty());
        let subjects = self
            .runner
            .read("list_subjects", |tx| {
                let module_id = module_id.clone();
                Box::pin(async move { Ok(tx.list_subjects(module_id.as_deref()).await?) })
            })
            .await?;
        Ok(subjects.into_iter().map(SubjectView::from).collect())
    }

    pub async fn get_subject(&self, id: &str) -> Result<SubjectView, ContentError> {
        let id = id.to_string();
        let record = self
            .runner
            .read("get_subject", |tx| {
                let id = id.clone();
                Box::pin(async move { fetch_subject(tx, &id).await })
            })
            .await?;
        Ok(record.into())
    }

    pub async fn list_lectures(
        &self,
        query: LectureListQuery,
    ) -> Result<Vec<AdminLectureView>, ContentError> {
        let unassigned = query.unassigned.unwrap_or(false);
        let subject_id = trimmed(query.subject_id.as_deref()).filter(|s| !s.is_empty());
        let lectures = self
            .runner
            .read("list_lectures", |tx| {
                let subject_id = subject_id.clone();
                Box::pin(async move {
                    let filter = match (&subject_id, unassigned) {
                        (_, true) => LectureFilter::Unassigned,
                        (Some(subject_id), false) => LectureFilter::Subject(subject_id),
                        (None, false) => LectureFilter::All,
                    };
                    Ok(tx.list_lectures(filter).await?)
                })
            })
            .await?;
        Ok(lectures.into_iter().map(AdminLectureView::from).collect())
    }

    pub async fn get_lecture(&self, id: &str) -> Result<AdminLectureView, ContentError> {
        let id = id.to_string();
        let record = self
            .runner
            .read("get_lecture", |tx| {
                let id = id.clone();
                Box::pin(async move { fetch_lecture(tx, &id).await })
            })
            .await?;
        Ok(record.into())
    }
}

// ==================== HELPERS ====================

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

fn optional_id(kind: EntityKind, value: Option<&str>) -> Result<Option<String>, ContentError> {
    value
        .map(|v| validate_id_format(kind, Some(v)))
        .transpose()
}

/// A field that may be left out of an update but not blanked.
fn optional_required(
    kind: EntityKind,
    field: &str,
    value: Option<&str>,
    id: &str,
) -> Result<Option<String>, ContentError> {
    value
        .map(|v| validate_required(kind, field, Some(v), Some(id)))
        .transpose()
}

async fn insert_new(tx: &mut dyn ContentTx, record: EntityRecord) -> Result<(), ContentError> {
    let kind = record.kind();
    tx.insert(&record).await.map_err(|err| match err {
        StoreError::DuplicateKey { .. } => ContentError::DuplicateId {
            kind,
            id: record.id().to_string(),
        },
        other => other.into(),
    })
}

async fn replace_existing(tx: &mut dyn ContentTx, record: EntityRecord) -> Result<(), ContentError> {
    if tx.replace(&record).await? {
        Ok(())
    } else {
        Err(ContentError::not_found(record.kind(), record.id()))
    }
}

/// Writes an updated record, renaming it first when `new_id` differs from
/// `current_id`. The parent reference is re-checked only when it changed.
async fn store_update(
    tx: &mut dyn ContentTx,
    current_id: &str,
    record: EntityRecord,
    new_id: Option<&str>,
    parent_changed: bool,
) -> Result<Option<RenameReport>, ContentError> {
    let kind = record.kind();
    if parent_changed {
        validate_reference(tx, kind, record.parent_id()).await?;
    }

    match new_id.filter(|new_id| *new_id != current_id) {
        Some(new_id) => {
            let stamp = record.updated_at();
            let report = cascade_rename(tx, record, new_id, stamp).await?;
            Ok(Some(report))
        }
        None => {
            replace_existing(tx, record).await?;
            Ok(None)
        }
    }
}

fn log_update(kind: EntityKind, id: &str, renamed: Option<&RenameReport>) {
    match renamed {
        Some(report) => {
            if let Some((child_kind, _)) = kind.child() {
                metrics::record_cascade(child_kind.as_str(), "repointed", report.children_repointed);
            }
            tracing::info!(
                kind = %kind,
                old_id = %report.old_id,
                new_id = %report.new_id,
                children_repointed = report.children_repointed,
                "Rename committed"
            );
        }
        None => tracing::info!(kind = %kind, id, "Updated"),
    }
}

pub(crate) async fn fetch_year(tx: &mut dyn ContentTx, id: &str) -> Result<YearRecord, ContentError> {
    match tx.fetch(EntityKind::Year, id).await? {
        Some(EntityRecord::Year(record)) => Ok(record),
        _ => Err(ContentError::not_found(EntityKind::Year, id)),
    }
}

pub(crate) async fn fetch_module(
    tx: &mut dyn ContentTx,
    id: &str,
) -> Result<ModuleRecord, ContentError> {
    match tx.fetch(EntityKind::Module, id).await? {
        Some(EntityRecord::Module(record)) => Ok(record),
        _ => Err(ContentError::not_found(EntityKind::Module, id)),
    }
}

pub(crate) async fn fetch_subject(
    tx: &mut dyn ContentTx,
    id: &str,
) -> Result<SubjectRecord, ContentError> {
    match tx.fetch(EntityKind::Subject, id).await? {
        Some(EntityRecord::Subject(record)) => Ok(record),
        _ => Err(ContentError::not_found(EntityKind::Subject, id)),
    }
}

pub(crate) async fn fetch_lecture(
    tx: &mut dyn ContentTx,
    id: &str,
) -> Result<LectureRecord, ContentError> {
    match tx.fetch(EntityKind::Lecture, id).await? {
        Some(EntityRecord::Lecture(record)) => Ok(record),
        _ => Err(ContentError::not_found(EntityKind::Lecture, id)),
    }
}
