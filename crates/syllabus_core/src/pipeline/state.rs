//! crates/syllabus_core/src/pipeline/state.rs
//!
//! The five-state machine a pipeline run moves through, and the snapshots the
//! caller renders from it.

use crate::domain::{ExtractionResult, StoredDocument};
use crate::error::PipelineError;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Select,
    Validate,
    Upload,
    Generate,
    Complete,
}

impl PipelineStage {
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::Select => 0,
            Self::Validate => 20,
            Self::Upload => 40,
            Self::Generate => 70,
            Self::Complete => 100,
        }
    }

    /// Every stage may fall back to `Select`; `Validate` may be re-run in place.
    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (_, Select) | (Select, Validate) | (Validate, Validate) | (Validate, Upload) | (Upload, Generate)
                | (Generate, Complete)
        )
    }
}

/// What the caller sees at every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub run_id: Uuid,
    pub stage: PipelineStage,
    pub progress_percent: u8,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Sent once the run reaches `Complete`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionSummary {
    pub tasks_created: usize,
    pub average_confidence: f64,
    pub warnings: Vec<String>,
}

/// Mutable state of one upload attempt.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub id: Uuid,
    stage: PipelineStage,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stored: Option<StoredDocument>,
    pub extraction: Option<ExtractionResult>,
    pub tasks_created: usize,
    pub average_confidence: f64,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: PipelineStage::Select,
            errors: Vec::new(),
            warnings: Vec::new(),
            stored: None,
            extraction: None,
            tasks_created: 0,
            average_confidence: 0.0,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn progress_percent(&self) -> u8 {
        self.stage.progress_percent()
    }

    pub fn advance(&mut self, next: PipelineStage) -> Result<(), PipelineError> {
        if !self.stage.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition { from: self.stage, to: next });
        }
        self.stage = next;
        Ok(())
    }

    /// Back to `Select`, dropping everything the run accumulated except the reason.
    pub fn reset_with(&mut self, message: impl Into<String>) {
        self.stage = PipelineStage::Select;
        self.errors = vec![message.into()];
        self.warnings.clear();
        self.stored = None;
        self.extraction = None;
        self.tasks_created = 0;
        self.average_confidence = 0.0;
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            run_id: self.id,
            stage: self.stage,
            progress_percent: self.progress_percent(),
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
        }
    }

    pub fn completion_summary(&self) -> Option<CompletionSummary> {
        (self.stage == PipelineStage::Complete).then(|| CompletionSummary {
            tasks_created: self.tasks_created,
            average_confidence: self.average_confidence,
            warnings: self.warnings.clone(),
        })
    }
}
