//! crates/syllabus_core/src/pipeline/augment.rs
//!
//! Second, narrower pass over the document. Anchors on what the pattern engine
//! already found (contact first names, assignment labels, assessment matches)
//! and fills fields it left weak. An optional semantic-similarity service breaks
//! ties between several plausible values; if it is missing, slow or failing the
//! rule-based choice stands.

use crate::domain::{AssignmentKind, ContactRecord, ExtractionResult, NormalizedText};
use crate::error::PipelineError;
use crate::pipeline::extract::{first_capture, window_after, PatternEngine};
use crate::ports::SemanticSimilarity;
use crate::rules::PatternRules;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A value found near an anchor, with the text around it for tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    value: String,
    context: String,
}

pub struct Augmenter {
    engine: PatternEngine,
    similarity: Arc<dyn SemanticSimilarity>,
    timeout: Duration,
}

impl Augmenter {
    pub fn new(rules: Arc<PatternRules>, similarity: Arc<dyn SemanticSimilarity>, timeout: Duration) -> Self {
        Self {
            engine: PatternEngine::new(rules),
            similarity,
            timeout,
        }
    }

    fn rules(&self) -> &PatternRules {
        self.engine.rules()
    }

    /// Refines office hours, missing due dates and assessment times.
    /// Never replaces a found value with a placeholder.
    pub async fn augment(&self, mut result: ExtractionResult, text: &NormalizedText) -> ExtractionResult {
        let text = text.as_str();

        for contact in result.instructor_info.iter_mut().chain(result.ta_info.iter_mut()) {
            if let Some(hours) = self.refine_office_hours(contact, text).await {
                debug!(role = contact.role.as_str(), email = %contact.email, office_hours = %hours, "Refined office hours");
                if !contact.has_office_hours() {
                    let stale = format!("No office hours found for {}", contact.name);
                    result.warnings.retain(|w| w != &stale);
                }
                contact.office_hours = hours;
            }
        }

        for assignment in result.assignments.iter_mut().filter(|a| a.due_date.is_none()) {
            if let Some(date) = self.refine_due_date(assignment.kind, &assignment.number, text).await {
                debug!(kind = assignment.kind.as_str(), number = %assignment.number, due = %date, "Recovered due date");
                let stale = format!(
                    "No due date found for {} {}",
                    assignment.kind.display_name(),
                    assignment.number
                );
                result.warnings.retain(|w| w != &stale);
                assignment.due_date = Some(date);
            }
        }

        for assessment in result.assessments.iter_mut().filter(|a| a.time.is_none()) {
            assessment.time = self.assessment_time(&assessment.raw_match_text, text);
        }

        result
    }

    //=====================================================================================
    // Office hours
    //=====================================================================================

    async fn refine_office_hours(&self, contact: &ContactRecord, text: &str) -> Option<String> {
        let first_name = contact.first_name()?;
        let anchors = word_positions(text, first_name);
        if anchors.is_empty() {
            return None;
        }

        let windows = self.rules().windows;
        // The labelled pattern captures the value; the bare schedule is the value.
        let tiers = [
            collect_candidates(text, &anchors, &self.rules().office_hours, windows.anchor),
            collect_candidates(text, &anchors, &self.rules().office_hours, windows.wide_anchor),
            collect_matches(text, &anchors, &self.rules().schedule, windows.anchor),
        ];

        let anchor = format!("{} office hours", contact.name);
        for candidates in tiers {
            if !candidates.is_empty() {
                let pick = self.tie_break(&anchor, &candidates).await;
                return Some(candidates[pick].value.clone());
            }
        }
        None
    }

    //=====================================================================================
    // Due dates
    //=====================================================================================

    async fn refine_due_date(&self, kind: AssignmentKind, number: &str, text: &str) -> Option<String> {
        let anchors: Vec<(usize, usize)> = self
            .engine
            .assignment_pattern(kind)
            .captures_iter(text)
            .filter(|caps| {
                caps.get(1)
                    .map(|n| n.as_str().trim_start_matches('0') == number.trim_start_matches('0'))
                    .unwrap_or(false)
            })
            .filter_map(|caps| caps.get(0).map(|m| (m.start(), m.end())))
            .collect();
        if anchors.is_empty() {
            return None;
        }

        let windows = self.rules().windows;
        let label = format!("{} {} due date", kind.display_name(), number);

        let candidates = collect_candidates(text, &anchors, &self.rules().due_phrase, windows.anchor);
        if !candidates.is_empty() {
            let pick = self.tie_break(&label, &candidates).await;
            return Some(candidates[pick].value.clone());
        }

        let candidates = collect_matches(text, &anchors, &self.rules().date, windows.wide_anchor);
        if !candidates.is_empty() {
            let pick = self.tie_break(&label, &candidates).await;
            return Some(candidates[pick].value.clone());
        }
        None
    }

    //=====================================================================================
    // Assessment times
    //=====================================================================================

    fn assessment_time(&self, raw_match_text: &str, text: &str) -> Option<String> {
        if let Some(m) = self.rules().time_of_day.find(raw_match_text) {
            return Some(m.as_str().trim().to_string());
        }
        let pos = text.find(raw_match_text)?;
        let after = window_after(text, pos + raw_match_text.len(), self.rules().windows.assessment_time);
        let line = after.split('\n').next().unwrap_or_default();
        self.rules()
            .time_of_day
            .find(line)
            .map(|m| m.as_str().trim().to_string())
    }

    //=====================================================================================
    // Semantic tie-break
    //=====================================================================================

    /// Index of the candidate whose context is closest to `anchor`. Falls back to
    /// the first candidate whenever the similarity service cannot answer.
    async fn tie_break(&self, anchor: &str, candidates: &[Candidate]) -> usize {
        let distinct = candidates
            .iter()
            .skip(1)
            .any(|c| c.value != candidates[0].value);
        if !distinct || !self.similarity.is_enabled() {
            return 0;
        }

        match self.rank(anchor, candidates).await {
            Ok(idx) => idx,
            Err(e) => {
                warn!(error = %e, "Semantic tie-break unavailable; keeping rule-based result");
                0
            }
        }
    }

    async fn rank(&self, anchor: &str, candidates: &[Candidate]) -> Result<usize, PipelineError> {
        let target = self.embed(anchor).await?;
        let mut best = (0, f32::MIN);
        for (idx, candidate) in candidates.iter().enumerate() {
            let vector = self.embed(&candidate.context).await?;
            let score = cosine_similarity(&target, &vector);
            if score > best.1 {
                best = (idx, score);
            }
        }
        Ok(best.0)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        match tokio::time::timeout(self.timeout, self.similarity.embed(text)).await {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(e)) => Err(PipelineError::Augmentation(e.to_string())),
            Err(_) => Err(PipelineError::Augmentation(format!(
                "embedding timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Byte offsets (start, end) of whole-word occurrences of `word`.
fn word_positions(text: &str, word: &str) -> Vec<(usize, usize)> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(word)
        .filter(|(start, _)| {
            let before = text[..*start].chars().next_back();
            let after = text[start + word.len()..].chars().next();
            !before.map(is_word).unwrap_or(false) && !after.map(is_word).unwrap_or(false)
        })
        .map(|(start, m)| (start, start + m.len()))
        .collect()
}

/// First capture of `pattern` after each anchor.
fn collect_candidates(text: &str, anchors: &[(usize, usize)], pattern: &Regex, width: usize) -> Vec<Candidate> {
    anchors
        .iter()
        .filter_map(|&(_, end)| {
            let window = window_after(text, end, width);
            first_capture(pattern, window).map(|value| Candidate {
                value,
                context: window.to_string(),
            })
        })
        .collect()
}

/// Whole first match of `pattern` after each anchor.
fn collect_matches(text: &str, anchors: &[(usize, usize)], pattern: &Regex, width: usize) -> Vec<Candidate> {
    anchors
        .iter()
        .filter_map(|&(_, end)| {
            let window = window_after(text, end, width);
            pattern.find(window).map(|m| Candidate {
                value: m.as_str().trim().to_string(),
                context: window.to_string(),
            })
        })
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
