//! crates/syllabus_core/src/domain.rs
//!
//! Defines the pure, core data structures for syllabus ingestion.
//! These structs are independent of any database or transport format.

use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Uploaded Document
//=========================================================================================

/// The syllabus exactly as the user supplied it. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub file_name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

impl Document {
    pub fn new(
        user_id: Uuid,
        class_id: Uuid,
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            class_id,
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The lowercased extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Where the file-storage collaborator put the raw document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDocument {
    pub path: String,
    pub url: String,
}

/// Metadata handed to file storage alongside the raw bytes.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub file_name: String,
    pub media_type: String,
}

impl From<&Document> for DocumentMetadata {
    fn from(doc: &Document) -> Self {
        Self {
            user_id: doc.user_id,
            class_id: doc.class_id,
            file_name: doc.file_name.clone(),
            media_type: doc.media_type.clone(),
        }
    }
}

/// Plain text recovered from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    char_count: usize,
}

impl NormalizedText {
    pub fn new(text: String) -> Self {
        let char_count = text.chars().count();
        Self { text, char_count }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }
}

//=========================================================================================
// Structured Records
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactRole {
    Instructor,
    Assistant,
}

impl ContactRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instructor => "instructor",
            Self::Assistant => "assistant",
        }
    }
}

/// One person reachable for the course, keyed on a detected email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub role: ContactRole,
    pub name: String,
    pub email: String,
    pub office_hours: String,
}

impl ContactRecord {
    pub const UNKNOWN_NAME: &'static str = "Unknown";
    pub const OFFICE_HOURS_PLACEHOLDER: &'static str = "Not listed in syllabus";

    pub fn has_name(&self) -> bool {
        self.name != Self::UNKNOWN_NAME
    }

    pub fn has_office_hours(&self) -> bool {
        self.office_hours != Self::OFFICE_HOURS_PLACEHOLDER
    }

    /// First word of the name, used as an anchor when refining office hours.
    pub fn first_name(&self) -> Option<&str> {
        if !self.has_name() {
            return None;
        }
        self.name.split_whitespace().next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Exam,
    Quiz,
    Midterm,
    Final,
}

impl AssessmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exam => "exam",
            Self::Quiz => "quiz",
            Self::Midterm => "midterm",
            Self::Final => "final",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Exam => "Exam",
            Self::Quiz => "Quiz",
            Self::Midterm => "Midterm Exam",
            Self::Final => "Final Exam",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub kind: AssessmentKind,
    /// Unparsed textual date token, e.g. "3/14" or "March 14".
    pub date: String,
    pub raw_match_text: String,
    /// False when the kind came from an alias ("test" is recorded as an exam).
    pub kind_was_explicit: bool,
    /// Raw time-of-day string attached by augmentation, e.g. "10:30am".
    pub time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Homework,
    Lab,
    Assignment,
    Project,
}

impl AssignmentKind {
    pub const ALL: [AssignmentKind; 4] = [
        AssignmentKind::Homework,
        AssignmentKind::Lab,
        AssignmentKind::Assignment,
        AssignmentKind::Project,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Homework => "homework",
            Self::Lab => "lab",
            Self::Assignment => "assignment",
            Self::Project => "project",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Homework => "Homework",
            Self::Lab => "Lab",
            Self::Assignment => "Assignment",
            Self::Project => "Project",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub kind: AssignmentKind,
    pub number: String,
    pub due_date: Option<String>,
    pub raw_match_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyScheduleEntry {
    pub week: u32,
    pub items: Vec<String>,
}

/// Everything the pattern engine found in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub instructor_info: Vec<ContactRecord>,
    pub ta_info: Vec<ContactRecord>,
    pub assessments: Vec<AssessmentRecord>,
    pub assignments: Vec<AssignmentRecord>,
    pub weekly_schedule: Vec<WeeklyScheduleEntry>,
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    pub fn contacts(&self) -> impl Iterator<Item = &ContactRecord> {
        self.instructor_info.iter().chain(self.ta_info.iter())
    }
}

//=========================================================================================
// Tasks
//=========================================================================================

/// The kind of calendar task, as stored by the task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Homework,
    Lab,
    Assignment,
    Project,
    Exam,
    Quiz,
    Midterm,
    Final,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Homework => "homework",
            Self::Lab => "lab",
            Self::Assignment => "assignment",
            Self::Project => "project",
            Self::Exam => "exam",
            Self::Quiz => "quiz",
            Self::Midterm => "midterm",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AssignmentKind> for TaskType {
    fn from(kind: AssignmentKind) -> Self {
        match kind {
            AssignmentKind::Homework => Self::Homework,
            AssignmentKind::Lab => Self::Lab,
            AssignmentKind::Assignment => Self::Assignment,
            AssignmentKind::Project => Self::Project,
        }
    }
}

impl From<AssessmentKind> for TaskType {
    fn from(kind: AssessmentKind) -> Self {
        match kind {
            AssessmentKind::Exam => Self::Exam,
            AssessmentKind::Quiz => Self::Quiz,
            AssessmentKind::Midterm => Self::Midterm,
            AssessmentKind::Final => Self::Final,
        }
    }
}

/// The class a syllabus belongs to, used to anchor textual dates to a term.
#[derive(Debug, Clone)]
pub struct ClassContext {
    pub class_id: Uuid,
    pub name: String,
    pub term_start: NaiveDate,
    pub term_end: Option<NaiveDate>,
}

/// A task proposed from an extracted record, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateTask {
    pub title: String,
    pub class_id: Uuid,
    pub due_date: NaiveDate,
    pub confidence: f64,
    pub source_kind: TaskType,
    /// True when `due_date` came from a fallback rather than the document.
    pub due_date_is_fallback: bool,
}

/// What the task store receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub class_id: Uuid,
    pub due_date: NaiveDate,
    pub task_type: TaskType,
}

impl From<&CandidateTask> for NewTask {
    fn from(task: &CandidateTask) -> Self {
        Self {
            title: task.title.clone(),
            class_id: task.class_id,
            due_date: task.due_date,
            task_type: task.source_kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTask {
    pub id: Uuid,
    pub title: String,
    pub class_id: Uuid,
    pub due_date: NaiveDate,
    pub task_type: TaskType,
}
