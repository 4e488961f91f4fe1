//! crates/syllabus_core/src/pipeline/tasks.rs
//!
//! Turns extracted records into candidate calendar tasks, then persists them.
//! Persistence is fail-open: one task failing to save never stops the others,
//! unless the store rejects the caller outright (authentication or quota).

use crate::domain::{
    AssessmentKind, AssessmentRecord, AssignmentRecord, CandidateTask, ClassContext,
    ExtractionResult, NewTask, PersistedTask,
};
use crate::error::{PipelineError, TransportCategory};
use crate::pipeline::dates::resolve_date;
use crate::pipeline::scoring::{ConfidenceScorer, ConfidenceSignals};
use crate::ports::{PortError, TaskStore};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

//=========================================================================================
// Generation
//=========================================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationOutput {
    pub tasks: Vec<CandidateTask>,
    pub warnings: Vec<String>,
    pub average_confidence: f64,
}

pub struct TaskGenerator {
    scorer: Arc<dyn ConfidenceScorer>,
}

impl TaskGenerator {
    pub fn new(scorer: Arc<dyn ConfidenceScorer>) -> Self {
        Self { scorer }
    }

    /// One candidate per assignment and per assessment, after dropping duplicates.
    pub fn generate(&self, result: &ExtractionResult, class: &ClassContext) -> GenerationOutput {
        let mut output = GenerationOutput::default();

        for assignment in &result.assignments {
            let task = self.from_assignment(assignment, class, &mut output.warnings);
            output.tasks.push(task);
        }

        let final_dates: HashSet<String> = result
            .assessments
            .iter()
            .filter(|a| a.kind == AssessmentKind::Final)
            .map(|a| a.date.to_lowercase())
            .collect();
        for assessment in &result.assessments {
            if assessment.kind == AssessmentKind::Exam && final_dates.contains(&assessment.date.to_lowercase()) {
                continue;
            }
            let task = self.from_assessment(assessment, class, &mut output.warnings);
            output.tasks.push(task);
        }

        let mut seen = HashSet::new();
        output
            .tasks
            .retain(|task| seen.insert((task.title.to_lowercase(), task.due_date)));

        if !output.tasks.is_empty() {
            output.average_confidence =
                output.tasks.iter().map(|t| t.confidence).sum::<f64>() / output.tasks.len() as f64;
        }
        output
    }

    fn from_assignment(
        &self,
        record: &AssignmentRecord,
        class: &ClassContext,
        warnings: &mut Vec<String>,
    ) -> CandidateTask {
        let title = format!("{} {}", record.kind.display_name(), record.number);
        let number_ok = !record.number.is_empty() && record.number.chars().all(|c| c.is_ascii_digit());
        let resolved = record
            .due_date
            .as_deref()
            .and_then(|token| resolve_date(token, class.term_start));

        let (due_date, is_fallback) = match (resolved, record.due_date.as_deref()) {
            (Some(date), _) => (date, false),
            (None, token) => {
                let weeks = record.number.parse::<i64>().unwrap_or(1).clamp(1, 52);
                let fallback = clamp_to_term(class.term_start + Duration::days(7 * weeks), class);
                warnings.push(match token {
                    Some(token) => format!("Could not interpret due date '{token}' for {title}; using {fallback}"),
                    None => format!("No due date for {title}; defaulted to {fallback}"),
                });
                (fallback, true)
            }
        };

        let signals = ConfidenceSignals {
            explicit_due_date: !is_fallback,
            recognized_kind: !record.raw_match_text.to_lowercase().starts_with("hw"),
            recognized_format: number_ok && (record.due_date.is_none() || !is_fallback),
        };

        CandidateTask {
            title,
            class_id: class.class_id,
            due_date,
            confidence: self.scorer.score(&signals),
            source_kind: record.kind.into(),
            due_date_is_fallback: is_fallback,
        }
    }

    fn from_assessment(
        &self,
        record: &AssessmentRecord,
        class: &ClassContext,
        warnings: &mut Vec<String>,
    ) -> CandidateTask {
        let title = match &record.time {
            Some(time) => format!("{} ({}, {})", record.kind.display_name(), record.date, time),
            None => format!("{} ({})", record.kind.display_name(), record.date),
        };
        let resolved = resolve_date(&record.date, class.term_start);
        let (due_date, is_fallback) = match resolved {
            Some(date) => (date, false),
            None => {
                let fallback = class
                    .term_end
                    .unwrap_or_else(|| clamp_to_term(class.term_start + Duration::days(7), class));
                warnings.push(format!(
                    "Could not interpret date '{}' for {}; using {}",
                    record.date,
                    record.kind.display_name(),
                    fallback
                ));
                (fallback, true)
            }
        };

        let signals = ConfidenceSignals {
            explicit_due_date: !is_fallback,
            recognized_kind: record.kind_was_explicit,
            recognized_format: !is_fallback,
        };

        CandidateTask {
            title,
            class_id: class.class_id,
            due_date,
            confidence: self.scorer.score(&signals),
            source_kind: record.kind.into(),
            due_date_is_fallback: is_fallback,
        }
    }
}

fn clamp_to_term(date: NaiveDate, class: &ClassContext) -> NaiveDate {
    match class.term_end {
        Some(end) if date > end => end,
        _ => date,
    }
}

//=========================================================================================
// Materialization
//=========================================================================================

#[derive(Debug, Clone, Default)]
pub struct MaterializationReport {
    pub created: Vec<PersistedTask>,
    pub skipped_existing: usize,
    pub warnings: Vec<String>,
}

impl MaterializationReport {
    pub fn tasks_created(&self) -> usize {
        self.created.len()
    }
}

/// The store refused the whole batch. `report` holds what was saved before.
#[derive(Debug)]
pub struct MaterializationHalt {
    pub report: MaterializationReport,
    pub error: PipelineError,
}

pub struct TaskMaterializer {
    store: Arc<dyn TaskStore>,
    timeout: std::time::Duration,
}

impl TaskMaterializer {
    pub fn new(store: Arc<dyn TaskStore>, timeout: std::time::Duration) -> Self {
        Self { store, timeout }
    }

    /// Persists every candidate, skipping ones the class already has. Failures
    /// are collected as warnings; tasks created before a failure are kept.
    /// An authentication or quota rejection stops the batch.
    pub async fn materialize(
        &self,
        tasks: &[CandidateTask],
        class_id: Uuid,
    ) -> Result<MaterializationReport, MaterializationHalt> {
        let mut report = MaterializationReport::default();

        let existing: HashSet<(String, NaiveDate)> =
            match tokio::time::timeout(self.timeout, self.store.list_tasks_for_class(class_id)).await {
                Ok(Ok(tasks)) => tasks
                    .into_iter()
                    .map(|t| (t.title.to_lowercase(), t.due_date))
                    .collect(),
                Ok(Err(e)) => {
                    warn!(%class_id, error = %e, "Could not list existing tasks");
                    report
                        .warnings
                        .push(format!("Could not check for existing tasks: {e}"));
                    HashSet::new()
                }
                Err(_) => {
                    warn!(%class_id, "Listing existing tasks timed out");
                    report
                        .warnings
                        .push("Could not check for existing tasks: request timed out".to_string());
                    HashSet::new()
                }
            };

        for task in tasks {
            if existing.contains(&(task.title.to_lowercase(), task.due_date)) {
                report.skipped_existing += 1;
                continue;
            }

            let new_task = NewTask::from(task);
            let outcome = match tokio::time::timeout(self.timeout, self.store.create_task(&new_task)).await {
                Ok(Ok(persisted)) => Ok(persisted),
                Ok(Err(e)) if rejects_caller(&e) => {
                    warn!(%class_id, error = %e, created = report.created.len(), "Task store rejected the batch");
                    return Err(MaterializationHalt {
                        report,
                        error: PipelineError::transport("task store", &e),
                    });
                }
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {:?}", self.timeout)),
            };

            match outcome {
                Ok(persisted) => report.created.push(persisted),
                Err(reason) => {
                    let err = PipelineError::Materialization {
                        title: task.title.clone(),
                        reason,
                    };
                    warn!(%class_id, error = %err, "Task creation failed");
                    report.warnings.push(err.to_string());
                }
            }
        }

        if report.skipped_existing > 0 {
            report.warnings.push(format!(
                "{} task(s) already existed for this class and were skipped",
                report.skipped_existing
            ));
        }
        info!(
            %class_id,
            created = report.created.len(),
            failed = tasks.len() - report.created.len() - report.skipped_existing,
            "Materialization finished"
        );
        Ok(report)
    }
}

/// Failures no retry of the next task would get past.
fn rejects_caller(err: &PortError) -> bool {
    matches!(
        TransportCategory::from_port_error(err),
        TransportCategory::Authentication | TransportCategory::Quota
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssignmentKind, TaskType};
    use crate::pipeline::scoring::WeightedConfidence;
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    /// Saves tasks until `fail_from`, then answers every call with `failure`.
    struct FlakyStore {
        saved: Mutex<Vec<NewTask>>,
        fail_from: usize,
        failure: fn() -> PortError,
    }

    impl FlakyStore {
        fn new(fail_from: usize, failure: fn() -> PortError) -> Self {
            Self {
                saved: Mutex::new(Vec::new()),
                fail_from,
                failure,
            }
        }
    }

    #[async_trait]
    impl TaskStore for FlakyStore {
        async fn create_task(&self, task: &NewTask) -> PortResult<PersistedTask> {
            let mut saved = self.saved.lock().unwrap();
            if saved.len() >= self.fail_from {
                return Err((self.failure)());
            }
            saved.push(task.clone());
            Ok(PersistedTask {
                id: Uuid::new_v4(),
                title: task.title.clone(),
                class_id: task.class_id,
                due_date: task.due_date,
                task_type: task.task_type,
            })
        }

        async fn list_tasks_for_class(&self, _class_id: Uuid) -> PortResult<Vec<PersistedTask>> {
            Ok(Vec::new())
        }
    }

    fn class() -> ClassContext {
        ClassContext {
            class_id: Uuid::new_v4(),
            name: "CS 101".to_string(),
            term_start: NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
            term_end: NaiveDate::from_ymd_opt(2025, 5, 9),
        }
    }

    fn generator() -> TaskGenerator {
        TaskGenerator::new(Arc::new(WeightedConfidence::default()))
    }

    fn assignment(kind: AssignmentKind, number: &str, due: Option<&str>) -> AssignmentRecord {
        AssignmentRecord {
            kind,
            number: number.to_string(),
            due_date: due.map(str::to_string),
            raw_match_text: format!("{} {}", kind.display_name(), number),
        }
    }

    fn assessment(kind: AssessmentKind, date: &str) -> AssessmentRecord {
        AssessmentRecord {
            kind,
            date: date.to_string(),
            raw_match_text: format!("{} {}", kind.as_str(), date),
            kind_was_explicit: true,
            time: None,
        }
    }

    #[test]
    fn explicit_due_date_outscores_fallback() {
        let mut result = ExtractionResult::default();
        result.assignments.push(assignment(AssignmentKind::Homework, "3", Some("3/14")));
        result.assignments.push(assignment(AssignmentKind::Homework, "4", None));

        let output = generator().generate(&result, &class());
        assert_eq!(output.tasks.len(), 2);
        let explicit = &output.tasks[0];
        let fallback = &output.tasks[1];
        assert_eq!(explicit.due_date, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert!(!explicit.due_date_is_fallback);
        assert!(fallback.due_date_is_fallback);
        assert!(explicit.confidence >= fallback.confidence);
        assert!(output.tasks.iter().all(|t| (0.0..=1.0).contains(&t.confidence)));
        assert_eq!(output.warnings.len(), 1);
    }

    #[test]
    fn fallback_dates_stay_inside_the_term() {
        let mut result = ExtractionResult::default();
        result.assignments.push(assignment(AssignmentKind::Project, "40", None));
        let output = generator().generate(&result, &class());
        assert_eq!(output.tasks[0].due_date, NaiveDate::from_ymd_opt(2025, 5, 9).unwrap());
    }

    #[test]
    fn exam_sharing_a_final_date_is_dropped() {
        let mut result = ExtractionResult::default();
        result.assessments.push(assessment(AssessmentKind::Exam, "May 5"));
        result.assessments.push(assessment(AssessmentKind::Quiz, "2/3"));
        result.assessments.push(assessment(AssessmentKind::Final, "May 5"));

        let output = generator().generate(&result, &class());
        let kinds: Vec<_> = output.tasks.iter().map(|t| t.source_kind).collect();
        assert_eq!(kinds, vec![TaskType::Quiz, TaskType::Final]);
        assert_eq!(output.tasks[1].title, "Final Exam (May 5)");
    }

    #[test]
    fn average_confidence_is_the_mean() {
        let mut result = ExtractionResult::default();
        result.assignments.push(assignment(AssignmentKind::Lab, "1", Some("1/20")));
        result.assessments.push(assessment(AssessmentKind::Quiz, "sometime"));
        let output = generator().generate(&result, &class());
        let mean = output.tasks.iter().map(|t| t.confidence).sum::<f64>() / 2.0;
        assert!((output.average_confidence - mean).abs() < 1e-9);
    }

    #[test]
    fn empty_result_has_zero_average() {
        let output = generator().generate(&ExtractionResult::default(), &class());
        assert!(output.tasks.is_empty());
        assert_eq!(output.average_confidence, 0.0);
    }

    fn three_candidates(class: &ClassContext) -> Vec<CandidateTask> {
        let mut result = ExtractionResult::default();
        for (number, due) in [("1", "1/20"), ("2", "1/27"), ("3", "2/3")] {
            result.assignments.push(assignment(AssignmentKind::Homework, number, Some(due)));
        }
        generator().generate(&result, class).tasks
    }

    #[tokio::test]
    async fn ordinary_failures_become_warnings() {
        let class = class();
        let store = Arc::new(FlakyStore::new(1, || PortError::Unexpected("constraint violated".into())));
        let materializer = TaskMaterializer::new(store.clone(), StdDuration::from_secs(1));

        let report = materializer
            .materialize(&three_candidates(&class), class.class_id)
            .await
            .unwrap();
        assert_eq!(report.tasks_created(), 1);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].starts_with("could not create task 'Homework 2'"));
    }

    #[tokio::test]
    async fn authentication_rejection_stops_the_batch() {
        let class = class();
        let store = Arc::new(FlakyStore::new(1, || PortError::Unauthorized));
        let materializer = TaskMaterializer::new(store.clone(), StdDuration::from_secs(1));

        let halt = materializer
            .materialize(&three_candidates(&class), class.class_id)
            .await
            .unwrap_err();
        assert_eq!(halt.report.tasks_created(), 1);
        assert!(matches!(
            halt.error,
            PipelineError::Transport {
                category: TransportCategory::Authentication,
                ..
            }
        ));
        assert_eq!(store.saved.lock().unwrap().len(), 1);
    }
}
