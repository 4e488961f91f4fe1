pub mod config;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod rules;

pub use config::PipelineConfig;
pub use domain::{
    AssessmentKind, AssessmentRecord, AssignmentKind, AssignmentRecord, CandidateTask, ClassContext,
    ContactRecord, Document, ExtractionResult, NewTask, PersistedTask, StoredDocument, TaskType,
};
pub use error::{ExtractionError, PipelineError, TransportCategory};
pub use pipeline::{
    CompletionSummary, NoopObserver, PipelineObserver, PipelinePorts, PipelineRun, PipelineSnapshot,
    PipelineStage, SyllabusPipeline,
};
pub use ports::{
    ClassDirectory, DocumentTextConverter, FileStorage, NullSimilarity, PortError, PortResult,
    RateLimitStore, SemanticSimilarity, TaskStore,
};
pub use rules::{PatternRules, RuleSource};
