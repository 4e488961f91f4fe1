//! crates/syllabus_core/src/pipeline/extract.rs
//!
//! The rule-based extraction engine. Pure and deterministic: the same text
//! always yields the same `ExtractionResult`.

use crate::domain::{
    AssessmentKind, AssessmentRecord, AssignmentKind, AssignmentRecord, ContactRecord,
    ContactRole, ExtractionResult, NormalizedText, WeeklyScheduleEntry,
};
use crate::rules::PatternRules;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Runs every detection rule over a document's text.
#[derive(Debug, Clone)]
pub struct PatternEngine {
    rules: Arc<PatternRules>,
}

impl PatternEngine {
    pub fn new(rules: Arc<PatternRules>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &PatternRules {
        &self.rules
    }

    /// Extracts every structured record the rules can find.
    /// Each detection step runs independently; finding nothing is never an error.
    pub fn extract(&self, text: &NormalizedText) -> ExtractionResult {
        let text = text.as_str();
        let mut result = ExtractionResult::default();

        result.instructor_info = self.contacts(text, ContactRole::Instructor, &mut result.warnings);
        result.ta_info = self.contacts(text, ContactRole::Assistant, &mut result.warnings);
        result.assessments = self.assessments(text);
        result.assignments = self.assignments(text);
        result.weekly_schedule = self.weekly_schedule(text);

        if result.instructor_info.is_empty() {
            result.warnings.push("No instructor contact information found".to_string());
        }
        if result.assessments.is_empty() {
            result.warnings.push("No exams or quizzes with dates found".to_string());
        }
        if result.assignments.is_empty() {
            result.warnings.push("No numbered assignments found".to_string());
        }
        for assignment in result.assignments.iter().filter(|a| a.due_date.is_none()) {
            result.warnings.push(format!(
                "No due date found for {} {}",
                assignment.kind.display_name(),
                assignment.number
            ));
        }

        result
    }

    //=====================================================================================
    // Contacts
    //=====================================================================================

    fn contacts(&self, text: &str, role: ContactRole, warnings: &mut Vec<String>) -> Vec<ContactRecord> {
        let (label, block_end, role_hours) = match role {
            ContactRole::Instructor => (
                &self.rules.instructor_label,
                &self.rules.instructor_block_end,
                &self.rules.instructor_office_hours,
            ),
            ContactRole::Assistant => (
                &self.rules.assistant_label,
                &self.rules.assistant_block_end,
                &self.rules.assistant_office_hours,
            ),
        };

        let mut seen = HashSet::new();
        let mut contacts = Vec::new();

        for label_match in label.find_iter(text) {
            let block = contact_block(text, label_match.end(), block_end, self.rules.windows.contact_block);

            for email in self.rules.email.find_iter(block) {
                if !seen.insert(email.as_str().to_lowercase()) {
                    continue;
                }
                let name = self
                    .rules
                    .name
                    .captures_iter(&block[..email.start()])
                    .last()
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_else(|| ContactRecord::UNKNOWN_NAME.to_string());

                let office_hours = first_capture(role_hours, text)
                    .or_else(|| first_capture(&self.rules.office_hours, text));
                if office_hours.is_none() {
                    warnings.push(format!("No office hours found for {name}"));
                }

                contacts.push(ContactRecord {
                    role,
                    name,
                    email: email.as_str().to_string(),
                    office_hours: office_hours
                        .unwrap_or_else(|| ContactRecord::OFFICE_HOURS_PLACEHOLDER.to_string()),
                });
            }
        }

        contacts
    }

    //=====================================================================================
    // Assessments
    //=====================================================================================

    fn assessments(&self, text: &str) -> Vec<AssessmentRecord> {
        let mut records = Vec::new();

        for caps in self.rules.assessment.captures_iter(text) {
            let token = caps[1].to_lowercase();
            let (kind, kind_was_explicit) = match token.as_str() {
                "midterm" => (AssessmentKind::Midterm, true),
                "quiz" => (AssessmentKind::Quiz, true),
                "exam" => (AssessmentKind::Exam, true),
                _ => (AssessmentKind::Exam, false),
            };
            records.push(AssessmentRecord {
                kind,
                date: caps[2].trim().to_string(),
                raw_match_text: caps[0].to_string(),
                kind_was_explicit,
                time: None,
            });
        }

        for caps in self.rules.final_exam.captures_iter(text) {
            records.push(AssessmentRecord {
                kind: AssessmentKind::Final,
                date: caps[1].trim().to_string(),
                raw_match_text: caps[0].to_string(),
                kind_was_explicit: true,
                time: None,
            });
        }

        records
    }

    //=====================================================================================
    // Assignments
    //=====================================================================================

    fn assignments(&self, text: &str) -> Vec<AssignmentRecord> {
        let mut records = Vec::new();

        for kind in AssignmentKind::ALL {
            let pattern = self.assignment_pattern(kind);
            // Later mentions of the same number are discarded, not merged.
            let mut found: Vec<(String, String, (usize, usize))> = Vec::new();

            for caps in pattern.captures_iter(text) {
                let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let number = number.as_str().trim_start_matches('0');
                let number = if number.is_empty() { "0" } else { number };
                if !found.iter().any(|(n, _, _)| n == number) {
                    found.push((
                        number.to_string(),
                        whole.as_str().to_string(),
                        (whole.start(), whole.end()),
                    ));
                }
            }

            for (number, raw_match_text, span) in found {
                let due_date = self.due_date(text, span);
                records.push(AssignmentRecord {
                    kind,
                    number,
                    due_date,
                    raw_match_text,
                });
            }
        }

        records
    }

    pub(crate) fn assignment_pattern(&self, kind: AssignmentKind) -> &Regex {
        match kind {
            AssignmentKind::Homework => &self.rules.homework,
            AssignmentKind::Lab => &self.rules.lab,
            AssignmentKind::Assignment => &self.rules.assignment,
            AssignmentKind::Project => &self.rules.project,
        }
    }

    /// Three tiers around the first mention, first hit wins: a "due" phrase on
    /// its line, then a date inside the week section holding it, then any date
    /// close to it.
    fn due_date(&self, text: &str, (first_start, first_end): (usize, usize)) -> Option<String> {
        let windows = self.rules.windows;

        let local = line_window(text, first_start, windows.due_local);
        if let Some(date) = first_capture(&self.rules.due_phrase, local) {
            return Some(date);
        }

        // TODO: restrict the week-scoped tier to dates on the same line as a
        // matching kind once two assignments sharing a week can be told apart.
        if let Some(section) = self.week_section(text, first_start) {
            if let Some(m) = self.rules.date.find(section) {
                return Some(m.as_str().trim().to_string());
            }
        }

        let after = window_after(text, first_end, windows.proximity);
        if let Some(m) = self.rules.date.find(after) {
            return Some(m.as_str().trim().to_string());
        }
        let before = window_before(text, first_start, windows.proximity);
        self.rules
            .date
            .find_iter(before)
            .last()
            .map(|m| m.as_str().trim().to_string())
    }

    /// The text from the last `week N` label before `pos` up to the next week label.
    fn week_section<'t>(&self, text: &'t str, pos: usize) -> Option<&'t str> {
        let label = self
            .rules
            .week_label
            .find_iter(&text[..pos])
            .last()?;
        let limit = floor_boundary(text, (label.start() + self.rules.windows.week_section).min(text.len()));
        let end = self
            .rules
            .week_label
            .find_at(text, label.end())
            .map(|next| next.start().min(limit))
            .unwrap_or(limit);
        Some(&text[label.start()..end])
    }

    //=====================================================================================
    // Weekly schedule
    //=====================================================================================

    fn weekly_schedule(&self, text: &str) -> Vec<WeeklyScheduleEntry> {
        let mut weeks: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        let labels: Vec<_> = self.rules.week_label.captures_iter(text).collect();

        for (idx, caps) in labels.iter().enumerate() {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Ok(week) = number.as_str().parse::<u32>() else {
                continue;
            };
            let limit = floor_boundary(text, (whole.end() + self.rules.windows.week_items).min(text.len()));
            let end = labels
                .get(idx + 1)
                .and_then(|next| next.get(0))
                .map(|next| next.start().min(limit))
                .unwrap_or(limit);
            let window = &text[whole.end()..end.max(whole.end())];

            let items: Vec<String> = self
                .rules
                .week_item
                .captures_iter(window)
                .map(|item| normalize_item(&item[1]))
                .collect();
            if !items.is_empty() {
                weeks.entry(week).or_default().extend(items);
            }
        }

        weeks
            .into_iter()
            .map(|(week, items)| WeeklyScheduleEntry { week, items })
            .collect()
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn normalize_item(token: &str) -> String {
    match token.to_lowercase().as_str() {
        "hw" => "homework".to_string(),
        other => other.to_string(),
    }
}

/// The trimmed first capture group of the first match.
pub(crate) fn first_capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// From `start` to the first block boundary, or at most `max` bytes.
fn contact_block<'t>(text: &'t str, start: usize, boundary: &Regex, max: usize) -> &'t str {
    let limit = floor_boundary(text, (start + max).min(text.len()));
    let end = boundary
        .find_at(text, start)
        .map(|m| m.start().min(limit))
        .unwrap_or(limit);
    &text[start..end.max(start)]
}

/// From `start` to the end of its line, or at most `max` bytes.
fn line_window(text: &str, start: usize, max: usize) -> &str {
    let limit = floor_boundary(text, (start + max).min(text.len()));
    let end = text[start..limit].find('\n').map(|i| start + i).unwrap_or(limit);
    &text[start..end]
}

pub(crate) fn window_after(text: &str, start: usize, len: usize) -> &str {
    let end = floor_boundary(text, (start + len).min(text.len()));
    &text[start..end]
}

pub(crate) fn window_before(text: &str, end: usize, len: usize) -> &str {
    let start = ceil_boundary(text, end.saturating_sub(len));
    &text[start..end]
}

pub(crate) fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PatternEngine {
        PatternEngine::new(Arc::new(PatternRules::standard().unwrap()))
    }

    fn extract(text: &str) -> ExtractionResult {
        engine().extract(&NormalizedText::new(text.to_string()))
    }

    #[test]
    fn instructor_with_inline_office_hours() {
        let result = extract(
            "CS 101 Syllabus\nInstructor: Dr. Jane Smith jsmith@uni.edu Office Hours: Mon 2-4pm\nHomework 3 due 3/14",
        );
        assert_eq!(result.instructor_info.len(), 1);
        let contact = &result.instructor_info[0];
        assert_eq!(contact.name, "Jane Smith");
        assert_eq!(contact.email, "jsmith@uni.edu");
        assert!(contact.office_hours.contains("Mon 2-4pm"));

        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].kind, AssignmentKind::Homework);
        assert_eq!(result.assignments[0].number, "3");
        assert_eq!(result.assignments[0].due_date.as_deref(), Some("3/14"));
    }

    #[test]
    fn missing_name_defaults_to_unknown() {
        let result = extract("Instructor: contact at prof@uni.edu for questions");
        assert_eq!(result.instructor_info[0].name, "Unknown");
        assert_eq!(
            result.instructor_info[0].office_hours,
            ContactRecord::OFFICE_HOURS_PLACEHOLDER
        );
        assert!(result.warnings.iter().any(|w| w.contains("No office hours")));
    }

    #[test]
    fn assistants_are_separated_from_instructor() {
        let text = "Instructor: Dr. Jane Smith, jsmith@uni.edu\n\
                    TA: Bob Lee, blee@uni.edu\n\
                    TA Office Hours: Wed 1-2pm";
        let result = extract(text);
        assert_eq!(result.instructor_info.len(), 1);
        assert_eq!(result.ta_info.len(), 1);
        assert_eq!(result.ta_info[0].name, "Bob Lee");
        assert_eq!(result.ta_info[0].email, "blee@uni.edu");
        assert!(result.ta_info[0].office_hours.contains("Wed 1-2pm"));
    }

    #[test]
    fn no_emails_and_no_weeks_yield_empty_sections() {
        let result = extract("This course covers the history of art. Readings are posted online each week.");
        assert!(result.instructor_info.is_empty());
        assert!(result.ta_info.is_empty());
        assert!(result.weekly_schedule.is_empty());
    }

    #[test]
    fn duplicate_assignments_keep_first_occurrence() {
        let text = "Lab 2 due 2/3\nReminder: lab 2 is worth 5%.\nLab #2 due 9/9";
        let result = extract(text);
        let labs: Vec<_> = result
            .assignments
            .iter()
            .filter(|a| a.kind == AssignmentKind::Lab)
            .collect();
        assert_eq!(labs.len(), 1);
        assert_eq!(labs[0].raw_match_text, "Lab 2");
        assert_eq!(labs[0].due_date.as_deref(), Some("2/3"));
    }

    #[test]
    fn later_duplicate_does_not_lend_its_due_date() {
        let text = format!(
            "Homework 1 covers loops and recursion.\n{}\nHomework 1 due 2/14",
            "Read chapters one through four before class.\n".repeat(4)
        );
        let result = extract(&text);
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].raw_match_text, "Homework 1");
        assert_eq!(result.assignments[0].due_date, None);
    }

    #[test]
    fn week_scoped_tier_used_when_no_due_phrase() {
        let text = "Week 4 (Feb 10)\nProject 1 kickoff\nWeek 5\nReading";
        let result = extract(text);
        let project = result
            .assignments
            .iter()
            .find(|a| a.kind == AssignmentKind::Project)
            .unwrap();
        assert_eq!(project.due_date.as_deref(), Some("Feb 10"));
    }

    #[test]
    fn test_is_recorded_as_exam_and_final_scanned_separately() {
        let text = "Test 1 on 2/20. Quiz on March 3. Final exam: May 12";
        let result = extract(text);
        let kinds: Vec<_> = result.assessments.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&AssessmentKind::Exam));
        assert!(kinds.contains(&AssessmentKind::Quiz));
        assert!(kinds.contains(&AssessmentKind::Final));
        let test = result.assessments.iter().find(|a| a.date == "2/20").unwrap();
        assert!(!test.kind_was_explicit);
    }

    #[test]
    fn weekly_schedule_groups_by_week_in_order() {
        let text = "Week 2: Lab and Quiz\nWeek 1: Homework, homework review\nWeek 2: Reading";
        let result = extract(text);
        assert_eq!(result.weekly_schedule.len(), 2);
        assert_eq!(result.weekly_schedule[0].week, 1);
        assert_eq!(result.weekly_schedule[0].items, vec!["homework", "homework"]);
        assert_eq!(result.weekly_schedule[1].week, 2);
        assert_eq!(result.weekly_schedule[1].items, vec!["lab", "quiz", "reading"]);
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "Instructor: Dr. Jane Smith jsmith@uni.edu\nWeek 1: Quiz 1/20\nHW 1 due 1/22";
        let first = extract(text);
        let second = extract(text);
        assert_eq!(first, second);
    }
}
