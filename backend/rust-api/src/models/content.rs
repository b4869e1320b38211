use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use validator::Validate;

use super::bson_datetime_as_chrono;

pub const YEARS_COLLECTION: &str = "years";
pub const MODULES_COLLECTION: &str = "modules";
pub const SUBJECTS_COLLECTION: &str = "subjects";
pub const LECTURES_COLLECTION: &str = "lectures";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Year,
    Module,
    Subject,
    Lecture,
    Question,
    QuizResult,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Year => "year",
            EntityKind::Module => "module",
            EntityKind::Subject => "subject",
            EntityKind::Lecture => "lecture",
            EntityKind::Question => "question",
            EntityKind::QuizResult => "quiz_result",
        }
    }

    /// Collection backing the kind. Questions are embedded in lectures.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Year => YEARS_COLLECTION,
            EntityKind::Module => MODULES_COLLECTION,
            EntityKind::Subject => SUBJECTS_COLLECTION,
            EntityKind::Lecture | EntityKind::Question => LECTURES_COLLECTION,
            EntityKind::QuizResult => super::quiz_result::QUIZ_RESULTS_COLLECTION,
        }
    }

    /// Direct child kind and the foreign-key field children use to point here.
    pub fn child(&self) -> Option<(EntityKind, &'static str)> {
        match self {
            EntityKind::Year => Some((EntityKind::Module, "yearId")),
            EntityKind::Module => Some((EntityKind::Subject, "moduleId")),
            EntityKind::Subject => Some((EntityKind::Lecture, "subjectId")),
            EntityKind::Lecture | EntityKind::Question | EntityKind::QuizResult => None,
        }
    }

    /// Parent kind and the foreign-key field on this kind.
    pub fn parent(&self) -> Option<(EntityKind, &'static str)> {
        match self {
            EntityKind::Year => None,
            EntityKind::Module => Some((EntityKind::Year, "yearId")),
            EntityKind::Subject => Some((EntityKind::Module, "moduleId")),
            EntityKind::Lecture => Some((EntityKind::Subject, "subjectId")),
            EntityKind::Question | EntityKind::QuizResult => {
                Some((EntityKind::Lecture, "lectureId"))
            }
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Year => "Year",
            EntityKind::Module => "Module",
            EntityKind::Subject => "Subject",
            EntityKind::Lecture => "Lecture",
            EntityKind::Question => "Question",
            EntityKind::QuizResult => "QuizResult",
        };
        f.write_str(label)
    }
}

// ==================== STORED RECORDS ====================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub year_id: String,
    pub name: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub module_id: String,
    pub name: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

/// Embedded in a lecture; never stored on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LectureRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

/// Any hierarchy record, tagged by kind. This is what crosses the store seam.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    Year(YearRecord),
    Module(ModuleRecord),
    Subject(SubjectRecord),
    Lecture(LectureRecord),
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRecord::Year(_) => EntityKind::Year,
            EntityRecord::Module(_) => EntityKind::Module,
            EntityRecord::Subject(_) => EntityKind::Subject,
            EntityRecord::Lecture(_) => EntityKind::Lecture,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRecord::Year(r) => &r.id,
            EntityRecord::Module(r) => &r.id,
            EntityRecord::Subject(r) => &r.id,
            EntityRecord::Lecture(r) => &r.id,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            EntityRecord::Year(_) => None,
            EntityRecord::Module(r) => Some(&r.year_id),
            EntityRecord::Subject(r) => Some(&r.module_id),
            EntityRecord::Lecture(r) => r.subject_id.as_deref(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            EntityRecord::Year(r) => r.created_at,
            EntityRecord::Module(r) => r.created_at,
            EntityRecord::Subject(r) => r.created_at,
            EntityRecord::Lecture(r) => r.created_at,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            EntityRecord::Year(r) => r.updated_at,
            EntityRecord::Module(r) => r.updated_at,
            EntityRecord::Subject(r) => r.updated_at,
            EntityRecord::Lecture(r) => r.updated_at,
        }
    }

    pub fn set_id(&mut self, id: &str) {
        match self {
            EntityRecord::Year(r) => r.id = id.to_string(),
            EntityRecord::Module(r) => r.id = id.to_string(),
            EntityRecord::Subject(r) => r.id = id.to_string(),
            EntityRecord::Lecture(r) => r.id = id.to_string(),
        }
    }

    pub fn set_updated_at(&mut self, updated_at: DateTime<Utc>) {
        match self {
            EntityRecord::Year(r) => r.updated_at = updated_at,
            EntityRecord::Module(r) => r.updated_at = updated_at,
            EntityRecord::Subject(r) => r.updated_at = updated_at,
            EntityRecord::Lecture(r) => r.updated_at = updated_at,
        }
    }
}

// ==================== ADMIN VIEWS ====================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct YearView {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<YearRecord> for YearView {
    fn from(record: YearRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            icon: record.icon,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleView {
    pub id: String,
    pub year_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ModuleRecord> for ModuleView {
    fn from(record: ModuleRecord) -> Self {
        Self {
            id: record.id,
            year_id: record.year_id,
            name: record.name,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectView {
    pub id: String,
    pub module_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SubjectRecord> for SubjectView {
    fn from(record: SubjectRecord) -> Self {
        Self {
            id: record.id,
            module_id: record.module_id,
            name: record.name,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Admin-facing lecture. Carries `correctAnswer` on every question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminLectureView {
    pub id: String,
    pub subject_id: Option<String>,
    pub title: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LectureRecord> for AdminLectureView {
    fn from(record: LectureRecord) -> Self {
        Self {
            id: record.id,
            subject_id: record.subject_id,
            title: record.title,
            questions: record.questions,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

// ==================== QUIZ-FACING VIEWS ====================

/// Question as served to quiz takers. There is deliberately no answer field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
}

impl From<&Question> for QuizQuestion {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            options: question.options.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizLectureView {
    pub id: String,
    pub subject_id: Option<String>,
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub updated_at: DateTime<Utc>,
}

impl From<&LectureRecord> for QuizLectureView {
    fn from(record: &LectureRecord) -> Self {
        Self {
            id: record.id.clone(),
            subject_id: record.subject_id.clone(),
            title: record.title.clone(),
            questions: record.questions.iter().map(QuizQuestion::from).collect(),
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LectureSummary {
    pub id: String,
    pub title: String,
    pub question_count: usize,
}

impl From<&LectureRecord> for LectureSummary {
    fn from(record: &LectureRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            question_count: record.questions.len(),
        }
    }
}

// ==================== HIERARCHY TREE ====================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct YearNode {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub modules: Vec<ModuleNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNode {
    pub id: String,
    pub name: String,
    pub subjects: Vec<SubjectNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectNode {
    pub id: String,
    pub name: String,
    pub lecture_count: u64,
}

// ==================== CASCADE REPORTS ====================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub kind: Option<EntityKind>,
    pub id: String,
    pub years: u64,
    pub modules: u64,
    pub subjects: u64,
    pub lectures: u64,
}

impl DeleteReport {
    pub fn total(&self) -> u64 {
        self.years + self.modules + self.subjects + self.lectures
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenameReport {
    pub kind: EntityKind,
    pub old_id: String,
    pub new_id: String,
    pub children_repointed: u64,
}

// ==================== REQUESTS ====================

/// Distinguishes an absent field from an explicit `null`.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct YearCreateRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200, message = "Name must be at most 200 characters"))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 64, message = "Icon must be at most 64 characters"))]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct YearUpdateRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200, message = "Name must be at most 200 characters"))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 64, message = "Icon must be at most 64 characters"))]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCreateRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub year_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200, message = "Name must be at most 200 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModuleUpdateRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub year_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200, message = "Name must be at most 200 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCreateRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200, message = "Name must be at most 200 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubjectUpdateRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200, message = "Name must be at most 200 characters"))]
    pub name: Option<String>,
}

/// Question as submitted by the admin panel. `correctAnswer` stays a raw JSON
/// value so a non-integer is reported as an invalid question, not a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LectureCreateRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200, message = "Title must be at most 200 characters"))]
    pub title: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionInput>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LectureUpdateRequest {
    #[serde(default)]
    pub id: Option<String>,
    /// `Some(None)` detaches the lecture from its subject.
    #[serde(default, deserialize_with = "deserialize_present")]
    pub subject_id: Option<Option<String>>,
    #[serde(default)]
    #[validate(length(max = 200, message = "Title must be at most 200 characters"))]
    pub title: Option<String>,
    #[serde(default)]
    pub questions: Option<Vec<QuestionInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    #[serde(default)]
    pub new_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleListQuery {
    #[serde(default)]
    pub year_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectListQuery {
    #[serde(default)]
    pub module_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureListQuery {
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub unassigned: Option<bool>,
}

/// Lecture filter understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LectureFilter<'a> {
    All,
    Subject(&'a str),
    Unassigned,
}
