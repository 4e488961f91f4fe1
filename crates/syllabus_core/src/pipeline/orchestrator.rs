//! crates/syllabus_core/src/pipeline/orchestrator.rs
//!
//! Sequences the stages of one syllabus upload and publishes a snapshot at
//! every transition.

use crate::config::PipelineConfig;
use crate::domain::{ClassContext, Document, DocumentMetadata};
use crate::error::PipelineError;
use crate::pipeline::augment::Augmenter;
use crate::pipeline::extract::PatternEngine;
use crate::pipeline::scoring::{ConfidenceScorer, WeightedConfidence};
use crate::pipeline::state::{PipelineRun, PipelineSnapshot, PipelineStage};
use crate::pipeline::tasks::{TaskGenerator, TaskMaterializer};
use crate::pipeline::text::TextExtractor;
use crate::pipeline::validate::{SecurityScanner, ValidationGate};
use crate::ports::{DocumentTextConverter, FileStorage, RateLimitStore, SemanticSimilarity, TaskStore};
use crate::rules::PatternRules;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

//=========================================================================================
// Observers
//=========================================================================================

/// Receives a snapshot each time the run changes stage.
pub trait PipelineObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: PipelineSnapshot);
}

impl PipelineObserver for UnboundedSender<PipelineSnapshot> {
    fn on_snapshot(&self, snapshot: PipelineSnapshot) {
        // The receiver going away just means nobody is watching any more.
        let _ = self.send(snapshot);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_snapshot(&self, _snapshot: PipelineSnapshot) {}
}

//=========================================================================================
// The Pipeline
//=========================================================================================

/// The collaborators a pipeline needs.
#[derive(Clone)]
pub struct PipelinePorts {
    pub storage: Arc<dyn FileStorage>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub converter: Arc<dyn DocumentTextConverter>,
    pub similarity: Arc<dyn SemanticSimilarity>,
    pub tasks: Arc<dyn TaskStore>,
}

pub struct SyllabusPipeline {
    storage: Arc<dyn FileStorage>,
    gate: ValidationGate,
    extractor: TextExtractor,
    engine: PatternEngine,
    augmenter: Augmenter,
    generator: TaskGenerator,
    materializer: TaskMaterializer,
}

impl SyllabusPipeline {
    /// Builds a pipeline with the standard rule tables and weighted confidence.
    pub fn new(config: Arc<PipelineConfig>, ports: PipelinePorts) -> Result<Self, regex::Error> {
        let rules = Arc::new(PatternRules::standard()?);
        Self::with_parts(config, ports, rules, Arc::new(WeightedConfidence::default()))
    }

    pub fn with_parts(
        config: Arc<PipelineConfig>,
        ports: PipelinePorts,
        rules: Arc<PatternRules>,
        scorer: Arc<dyn ConfidenceScorer>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            storage: ports.storage.clone(),
            gate: ValidationGate::new(config.clone(), ports.rate_limits, SecurityScanner::new()?),
            extractor: TextExtractor::new(
                ports.storage,
                ports.converter,
                config.min_text_chars,
                config.extraction_timeout,
            ),
            engine: PatternEngine::new(rules.clone()),
            augmenter: Augmenter::new(rules, ports.similarity, config.augmentation_timeout),
            generator: TaskGenerator::new(scorer),
            materializer: TaskMaterializer::new(ports.tasks, config.materialization_timeout),
        })
    }

    /// Drives one upload from file selection to task creation.
    ///
    /// Validation problems leave the run in `Validate`. Unreadable text and
    /// collaborator failures reset it to `Select`. Only cancellation makes this
    /// return an error; the run is then discarded, but tasks already saved stay.
    pub async fn run(
        &self,
        document: Document,
        class: &ClassContext,
        observer: &dyn PipelineObserver,
        cancel: CancellationToken,
    ) -> Result<PipelineRun, PipelineError> {
        let mut run = PipelineRun::new();
        let run_id = run.id;
        let user_id = document.user_id;
        info!(
            %run_id,
            %user_id,
            class_id = %class.class_id,
            class = %class.name,
            file = %document.file_name,
            "Pipeline run started"
        );
        observer.on_snapshot(run.snapshot());

        // --- Validate ---
        self.enter(&mut run, PipelineStage::Validate, observer, &cancel)?;
        let report = match until_cancelled(&cancel, self.gate.validate(&document, user_id)).await? {
            Ok(report) => report,
            Err(failure) => {
                let outage = PipelineError::transport("rate limit store", &failure.source);
                if failure.report.errors.is_empty() {
                    return Ok(self.fail(run, outage, observer));
                }
                // The other checks already rejected the document; report them with the outage.
                let mut errors = failure.report.errors;
                errors.push(outage.user_message());
                run.warnings.extend(failure.report.warnings);
                return Ok(self.fail(run, PipelineError::Validation(errors), observer));
            }
        };
        run.warnings.extend(report.warnings);
        if !report.ok {
            return Ok(self.fail(run, PipelineError::Validation(report.errors), observer));
        }

        // --- Upload ---
        self.enter(&mut run, PipelineStage::Upload, observer, &cancel)?;
        let metadata = DocumentMetadata::from(&document);
        let stored = match until_cancelled(&cancel, self.storage.upload_document(&document.bytes, &metadata)).await? {
            Ok(stored) => stored,
            Err(e) => return Ok(self.fail(run, PipelineError::transport("file storage", &e), observer)),
        };
        run.stored = Some(stored.clone());

        let text = match until_cancelled(&cancel, self.extractor.extract_text(&stored, &document.media_type)).await? {
            Ok(text) => text,
            Err(err) => return Ok(self.fail(run, err, observer)),
        };
        let extracted = self.engine.extract(&text);
        let augmented = until_cancelled(&cancel, self.augmenter.augment(extracted, &text)).await?;
        run.warnings.extend(augmented.warnings.iter().cloned());
        info!(
            %run_id,
            contacts = augmented.contacts().count(),
            assessments = augmented.assessments.len(),
            assignments = augmented.assignments.len(),
            stage = "upload",
            "Structured extraction finished"
        );

        // --- Generate ---
        self.enter(&mut run, PipelineStage::Generate, observer, &cancel)?;
        let generated = self.generator.generate(&augmented, class);
        run.extraction = Some(augmented);
        run.warnings.extend(generated.warnings);
        run.average_confidence = generated.average_confidence;

        let report =
            match until_cancelled(&cancel, self.materializer.materialize(&generated.tasks, class.class_id)).await? {
                Ok(report) => report,
                Err(halt) => {
                    info!(%run_id, kept = halt.report.tasks_created(), "Tasks saved before the store stopped the batch are kept");
                    return Ok(self.fail(run, halt.error, observer));
                }
            };
        run.tasks_created = report.tasks_created();
        run.warnings.extend(report.warnings);

        // Partial task creation still completes.
        if let Err(err) = run.advance(PipelineStage::Complete) {
            return Ok(self.fail(run, err, observer));
        }
        info!(
            %run_id,
            tasks_created = run.tasks_created,
            average_confidence = run.average_confidence,
            warnings = run.warnings.len(),
            "Pipeline run complete"
        );
        observer.on_snapshot(run.snapshot());
        Ok(run)
    }

    fn enter(
        &self,
        run: &mut PipelineRun,
        stage: PipelineStage,
        observer: &dyn PipelineObserver,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            info!(run_id = %run.id, stage = ?run.stage(), "Pipeline run cancelled");
            return Err(PipelineError::Cancelled);
        }
        run.advance(stage)?;
        observer.on_snapshot(run.snapshot());
        Ok(())
    }

    /// Ends the run on `err`: back to `Select` when the error resets the run,
    /// otherwise the run stays in its stage carrying the messages.
    fn fail(&self, mut run: PipelineRun, err: PipelineError, observer: &dyn PipelineObserver) -> PipelineRun {
        match &err {
            PipelineError::Validation(errors) => {
                info!(run_id = %run.id, errors = errors.len(), stage = ?run.stage(), "Document rejected")
            }
            PipelineError::Extraction(_) => warn!(run_id = %run.id, stage = ?run.stage(), error = %err, "Text extraction failed"),
            _ => error!(run_id = %run.id, stage = ?run.stage(), error = %err, "Pipeline run failed"),
        }
        if err.resets_run() {
            run.reset_with(err.user_message());
        } else {
            run.errors = err.into_messages();
        }
        observer.on_snapshot(run.snapshot());
        run
    }
}

/// Awaits `fut` unless the token fires first.
async fn until_cancelled<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        out = fut => Ok(out),
    }
}
