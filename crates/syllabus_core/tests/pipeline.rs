//! crates/syllabus_core/tests/pipeline.rs
//!
//! Drives whole pipeline runs against in-memory collaborators.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use syllabus_core::domain::DocumentMetadata;
use syllabus_core::{
    ClassContext, Document, DocumentTextConverter, FileStorage, NewTask, NoopObserver, NullSimilarity,
    PersistedTask, PipelineConfig, PipelineError, PipelinePorts, PipelineSnapshot, PipelineStage, PortError, PortResult,
    RateLimitStore, StoredDocument, SyllabusPipeline, TaskStore,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// Fakes
//=========================================================================================

#[derive(Default)]
struct MemoryStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
    uploads: AtomicUsize,
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn upload_document(&self, bytes: &[u8], metadata: &DocumentMetadata) -> PortResult<StoredDocument> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        let path = format!("{}/{}-{}", metadata.user_id, n, metadata.file_name);
        self.files.lock().unwrap().insert(path.clone(), bytes.to_vec());
        Ok(StoredDocument {
            url: format!("/documents/{path}"),
            path,
        })
    }

    async fn get_document_bytes(&self, path: &str) -> PortResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PortError::NotFound(path.to_string()))
    }
}

struct FixedRate(u32);

#[async_trait]
impl RateLimitStore for FixedRate {
    async fn get_recent_upload_count(&self, _user_id: Uuid, _window_seconds: u64) -> PortResult<u32> {
        Ok(self.0)
    }
}

struct UnreachableRate;

#[async_trait]
impl RateLimitStore for UnreachableRate {
    async fn get_recent_upload_count(&self, _user_id: Uuid, _window_seconds: u64) -> PortResult<u32> {
        Err(PortError::Unavailable("connection refused".to_string()))
    }
}

/// Task store that fails the `fail_on`-th create call (1-based) and answers
/// `Unauthorized` to every call after `unauthorized_after` saved tasks.
#[derive(Default)]
struct MemoryTasks {
    tasks: Mutex<Vec<PersistedTask>>,
    calls: AtomicUsize,
    fail_on: Option<usize>,
    unauthorized_after: Option<usize>,
}

#[async_trait]
impl TaskStore for MemoryTasks {
    async fn create_task(&self, task: &NewTask) -> PortResult<PersistedTask> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(call) == self.fail_on {
            return Err(PortError::Unexpected("constraint violation".to_string()));
        }
        if self.unauthorized_after.is_some_and(|n| self.tasks.lock().unwrap().len() >= n) {
            return Err(PortError::Unauthorized);
        }
        let persisted = PersistedTask {
            id: Uuid::new_v4(),
            title: task.title.clone(),
            class_id: task.class_id,
            due_date: task.due_date,
            task_type: task.task_type,
        };
        self.tasks.lock().unwrap().push(persisted.clone());
        Ok(persisted)
    }

    async fn list_tasks_for_class(&self, class_id: Uuid) -> PortResult<Vec<PersistedTask>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.class_id == class_id)
            .cloned()
            .collect())
    }
}

struct PlainText;

#[async_trait]
impl DocumentTextConverter for PlainText {
    async fn page_texts(&self, bytes: &[u8], _media_type: &str) -> PortResult<Vec<String>> {
        let text = String::from_utf8_lossy(bytes);
        Ok(text.split('\u{c}').map(str::to_string).collect())
    }
}

//=========================================================================================
// Harness
//=========================================================================================

const SYLLABUS: &str = "CS 101 Introduction to Programming
Instructor: Dr. Jane Smith jsmith@uni.edu Office Hours: Mon 2-4pm

Homework 1 due 1/20
Homework 2 due 1/27
Lab 1 due 1/22
Quiz on 2/3
Midterm exam on 3/5
Final exam: May 5
";

struct Harness {
    storage: Arc<MemoryStorage>,
    tasks: Arc<MemoryTasks>,
    pipeline: SyllabusPipeline,
    class: ClassContext,
    user_id: Uuid,
}

fn harness_with(rate_limits: Arc<dyn RateLimitStore>, tasks: MemoryTasks) -> Harness {
    let storage = Arc::new(MemoryStorage::default());
    let tasks = Arc::new(tasks);
    let ports = PipelinePorts {
        storage: storage.clone(),
        rate_limits,
        converter: Arc::new(PlainText),
        similarity: Arc::new(NullSimilarity),
        tasks: tasks.clone(),
    };
    let pipeline = SyllabusPipeline::new(Arc::new(PipelineConfig::default()), ports).unwrap();
    Harness {
        storage,
        tasks,
        pipeline,
        class: ClassContext {
            class_id: Uuid::new_v4(),
            name: "CS 101".to_string(),
            term_start: NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
            term_end: NaiveDate::from_ymd_opt(2025, 5, 9),
        },
        user_id: Uuid::new_v4(),
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(FixedRate(0)), MemoryTasks::default())
}

impl Harness {
    fn document(&self, bytes: impl Into<Vec<u8>>) -> Document {
        Document::new(self.user_id, self.class.class_id, "syllabus.txt", "text/plain", bytes.into())
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn text_syllabus_runs_to_completion() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel::<PipelineSnapshot>();

    let run = h
        .pipeline
        .run(h.document(SYLLABUS), &h.class, &tx, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.stage(), PipelineStage::Complete);
    assert_eq!(run.progress_percent(), 100);
    assert!(run.errors.is_empty());
    assert_eq!(run.tasks_created, 6);

    let extraction = run.extraction.as_ref().unwrap();
    assert_eq!(extraction.instructor_info[0].name, "Jane Smith");
    assert_eq!(extraction.instructor_info[0].email, "jsmith@uni.edu");
    assert!(extraction.instructor_info[0].office_hours.contains("Mon 2-4pm"));

    let titles: Vec<String> = h.tasks.tasks.lock().unwrap().iter().map(|t| t.title.clone()).collect();
    assert!(titles.contains(&"Homework 1".to_string()));
    assert!(titles.contains(&"Lab 1".to_string()));
    assert!(titles.contains(&"Final Exam (May 5)".to_string()));
    assert!(!titles.iter().any(|t| t == "Exam (May 5)"));

    drop(tx);
    let mut stages = Vec::new();
    while let Some(snapshot) = rx.recv().await {
        stages.push(snapshot.stage);
    }
    assert_eq!(
        stages,
        vec![
            PipelineStage::Select,
            PipelineStage::Validate,
            PipelineStage::Upload,
            PipelineStage::Generate,
            PipelineStage::Complete,
        ]
    );

    let summary = run.completion_summary().unwrap();
    assert!((0.0..=1.0).contains(&summary.average_confidence));
}

#[tokio::test]
async fn short_text_returns_to_select() {
    let h = harness();
    let run = h
        .pipeline
        .run(h.document("Scanned page."), &h.class, &NoopObserver, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.stage(), PipelineStage::Select);
    assert!(run.errors[0].contains("could not read the PDF"));
    assert!(run.extraction.is_none());
    assert!(h.tasks.tasks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_file_stays_in_validate() {
    let h = harness();
    let bytes = vec![b'a'; 15 * 1024 * 1024];
    let run = h
        .pipeline
        .run(h.document(bytes), &h.class, &NoopObserver, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.stage(), PipelineStage::Validate);
    assert!(run.errors.iter().any(|e| e.contains("exceeds the maximum")));
    assert_eq!(h.storage.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rate_limited_user_is_rejected_at_validate() {
    let h = harness_with(Arc::new(FixedRate(10)), MemoryTasks::default());
    let run = h
        .pipeline
        .run(h.document(SYLLABUS), &h.class, &NoopObserver, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.stage(), PipelineStage::Validate);
    assert!(run.errors.iter().any(|e| e.starts_with("Upload limit reached")));
}

#[tokio::test]
async fn unreachable_rate_store_resets_with_network_message() {
    let h = harness_with(Arc::new(UnreachableRate), MemoryTasks::default());
    let run = h
        .pipeline
        .run(h.document(SYLLABUS), &h.class, &NoopObserver, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.stage(), PipelineStage::Select);
    assert!(run.errors[0].starts_with("Network error"));
}

#[tokio::test]
async fn file_errors_survive_an_unreachable_rate_store() {
    let h = harness_with(Arc::new(UnreachableRate), MemoryTasks::default());
    let document = Document::new(
        h.user_id,
        h.class.class_id,
        "setup.exe",
        "application/x-msdownload",
        vec![b'a'; 15 * 1024 * 1024],
    );
    let run = h
        .pipeline
        .run(document, &h.class, &NoopObserver, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.stage(), PipelineStage::Validate);
    assert!(run.errors.iter().any(|e| e.starts_with("Unsupported file type")));
    assert!(run.errors.iter().any(|e| e.contains("exceeds the maximum")));
    assert!(run.errors.iter().any(|e| e.starts_with("Network error")));
    assert_eq!(h.storage.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_credentials_at_task_store_reset_the_run() {
    let tasks = MemoryTasks {
        unauthorized_after: Some(2),
        ..Default::default()
    };
    let h = harness_with(Arc::new(FixedRate(0)), tasks);
    let run = h
        .pipeline
        .run(h.document(SYLLABUS), &h.class, &NoopObserver, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.stage(), PipelineStage::Select);
    assert_eq!(run.errors.len(), 1);
    assert!(run.errors[0].contains("sign in again"));
    assert!(run.completion_summary().is_none());
    // Tasks saved before the rejection stay.
    assert_eq!(h.tasks.tasks.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn one_failed_task_still_completes() {
    let tasks = MemoryTasks {
        fail_on: Some(2),
        ..Default::default()
    };
    let h = harness_with(Arc::new(FixedRate(0)), tasks);
    let run = h
        .pipeline
        .run(h.document(SYLLABUS), &h.class, &NoopObserver, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.stage(), PipelineStage::Complete);
    assert_eq!(run.tasks_created, 5);
    let failures: Vec<_> = run
        .warnings
        .iter()
        .filter(|w| w.starts_with("could not create task"))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("constraint violation"));
}

#[tokio::test]
async fn reupload_skips_existing_tasks() {
    let h = harness();
    let first = h
        .pipeline
        .run(h.document(SYLLABUS), &h.class, &NoopObserver, CancellationToken::new())
        .await
        .unwrap();
    let second = h
        .pipeline
        .run(h.document(SYLLABUS), &h.class, &NoopObserver, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.tasks_created, 6);
    assert_eq!(second.stage(), PipelineStage::Complete);
    assert_eq!(second.tasks_created, 0);
    assert_eq!(h.tasks.tasks.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn cancelled_run_is_discarded() {
    let h = harness();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .pipeline
        .run(h.document(SYLLABUS), &h.class, &NoopObserver, cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(h.storage.uploads.load(Ordering::SeqCst), 0);
}
