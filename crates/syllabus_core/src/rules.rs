//! crates/syllabus_core/src/rules.rs
//!
//! Pattern-rule tables for syllabus extraction.
//!
//! `RuleSource` holds the raw expressions and window sizes; `PatternRules` is
//! the compiled, immutable form handed to the extraction engine and the
//! augmentation stage. Tests can build a reduced `RuleSource` and compile it
//! the same way.

use regex::Regex;

const MONTH: &str = r"(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";
const DAY: &str = r"(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?";
const CLOCK: &str = r"\d{1,2}(?::\d{2})?[ \t]*(?:[ap]\.?m\.?)?";

/// Date-shaped token: `M/D`, `M.D`, `M/D/YY(YY)` or `Month D`.
pub fn date_fragment() -> String {
    format!(r"(?:\b\d{{1,2}}[/.]\d{{1,2}}(?:[/.]\d{{2,4}})?\b|\b{MONTH}\.?[ \t]+\d{{1,2}}(?:st|nd|rd|th)?\b)")
}

/// Office-hours schedule: optional day list followed by a time range, or "by appointment".
pub fn schedule_fragment() -> String {
    format!(
        r"(?:(?:{DAY}(?:[ \t]*(?:,|/|&|and|-)[ \t]*{DAY})*[ \t]*,?[ \t]*)?{CLOCK}[ \t]*(?:-|–|to)[ \t]*{CLOCK}|by[ \t]+appointment)"
    )
}

/// Raw expressions and window sizes for the extraction rules.
#[derive(Debug, Clone)]
pub struct RuleSource {
    pub instructor_label: String,
    pub assistant_label: String,
    /// Ends an instructor block: an assistant label, an office-hours heading or a blank line.
    pub instructor_block_end: String,
    /// Ends an assistant block: an instructor label, an office-hours heading or a blank line.
    pub assistant_block_end: String,
    pub email: String,
    pub name: String,
    pub instructor_office_hours: String,
    pub assistant_office_hours: String,
    pub office_hours: String,
    pub schedule: String,
    pub assessment: String,
    pub final_exam: String,
    pub homework: String,
    pub lab: String,
    pub assignment: String,
    pub project: String,
    pub due_phrase: String,
    pub date: String,
    pub week_label: String,
    pub week_item: String,
    pub time_of_day: String,
    pub windows: RuleWindows,
}

/// Character windows bounding how far a rule may look from its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleWindows {
    pub contact_block: usize,
    pub due_local: usize,
    pub week_section: usize,
    pub proximity: usize,
    pub week_items: usize,
    pub anchor: usize,
    pub wide_anchor: usize,
    pub assessment_time: usize,
}

impl Default for RuleWindows {
    fn default() -> Self {
        Self {
            contact_block: 600,
            due_local: 120,
            week_section: 600,
            proximity: 80,
            week_items: 200,
            anchor: 200,
            wide_anchor: 400,
            assessment_time: 60,
        }
    }
}

impl Default for RuleSource {
    fn default() -> Self {
        let date = date_fragment();
        let schedule = schedule_fragment();
        let instructor = r"(?i:\b(?:instructor|professor|lecturer)s?\b)";
        let assistant = r"(?:(?i:\bteaching[ \t]+assistants?\b)|\bTAs?\b)";
        let heading = r"(?m:^[ \t]*(?i:office[ \t]+hours?)[ \t]*:?[ \t]*$)";

        Self {
            instructor_label: format!(r"{instructor}[ \t]*(?i:info(?:rmation)?)?[ \t]*:?"),
            assistant_label: format!(r"{assistant}[ \t]*(?i:info(?:rmation)?)?[ \t]*:?"),
            instructor_block_end: format!(r"{assistant}|{heading}|\n[ \t]*\n"),
            assistant_block_end: format!(r"{instructor}|{heading}|\n[ \t]*\n"),
            email: r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}".to_string(),
            name: r"(?:\b(?:Dr|Prof|Professor|Mr|Mrs|Ms|Mx)\.?[ \t]+)?\b([A-Z][a-z]+(?:[ \t]+[A-Z]\.)?(?:[ \t]+[A-Z][A-Za-z'\-]+)+)".to_string(),
            instructor_office_hours: format!(
                r"(?s){instructor}(?i:.{{0,250}}?office[ \t]+hours?[ \t]*[:\-]?[ \t]*({schedule}))"
            ),
            assistant_office_hours: format!(
                r"(?s){assistant}(?i:.{{0,250}}?office[ \t]+hours?[ \t]*[:\-]?[ \t]*({schedule}))"
            ),
            office_hours: format!(r"(?i)office[ \t]+hours?[ \t]*[:\-]?\s*({schedule})"),
            schedule: format!(r"(?i){schedule}"),
            assessment: format!(r"(?i)\b(midterm|exam|quiz|test)s?\b[^.\n]{{0,80}}?({date})"),
            final_exam: format!(r"(?i)\bfinal[ \t]+exam(?:ination)?\b[^.\n]{{0,80}}?({date})"),
            homework: r"(?i)\b(?:homework|hw)[ \t]*#?[ \t]*(\d+)\b".to_string(),
            lab: r"(?i)\blab[ \t]*#?[ \t]*(\d+)\b".to_string(),
            assignment: r"(?i)\bassignment[ \t]*#?[ \t]*(\d+)\b".to_string(),
            project: r"(?i)\bproject[ \t]*#?[ \t]*(\d+)\b".to_string(),
            due_phrase: format!(r"(?i)\bdue\b[^\n]{{0,30}}?({date})"),
            date: format!(r"(?i){date}"),
            week_label: r"(?i)\bweek[ \t]*(\d{1,2})\b".to_string(),
            week_item: r"(?i)\b(homework|hw|lab|quiz|exam|midterm|final|project|assignment|reading|presentation|essay|paper)s?\b".to_string(),
            time_of_day: r"(?i)\b\d{1,2}(?::\d{2})?[ \t]*[ap]\.?m\b\.?|\b\d{1,2}:\d{2}\b".to_string(),
            windows: RuleWindows::default(),
        }
    }
}

/// Compiled, immutable rule set.
#[derive(Debug, Clone)]
pub struct PatternRules {
    pub instructor_label: Regex,
    pub assistant_label: Regex,
    pub instructor_block_end: Regex,
    pub assistant_block_end: Regex,
    pub email: Regex,
    pub name: Regex,
    pub instructor_office_hours: Regex,
    pub assistant_office_hours: Regex,
    pub office_hours: Regex,
    pub schedule: Regex,
    pub assessment: Regex,
    pub final_exam: Regex,
    pub homework: Regex,
    pub lab: Regex,
    pub assignment: Regex,
    pub project: Regex,
    pub due_phrase: Regex,
    pub date: Regex,
    pub week_label: Regex,
    pub week_item: Regex,
    pub time_of_day: Regex,
    pub windows: RuleWindows,
}

impl PatternRules {
    pub fn compile(source: &RuleSource) -> Result<Self, regex::Error> {
        Ok(Self {
            instructor_label: Regex::new(&source.instructor_label)?,
            assistant_label: Regex::new(&source.assistant_label)?,
            instructor_block_end: Regex::new(&source.instructor_block_end)?,
            assistant_block_end: Regex::new(&source.assistant_block_end)?,
            email: Regex::new(&source.email)?,
            name: Regex::new(&source.name)?,
            instructor_office_hours: Regex::new(&source.instructor_office_hours)?,
            assistant_office_hours: Regex::new(&source.assistant_office_hours)?,
            office_hours: Regex::new(&source.office_hours)?,
            schedule: Regex::new(&source.schedule)?,
            assessment: Regex::new(&source.assessment)?,
            final_exam: Regex::new(&source.final_exam)?,
            homework: Regex::new(&source.homework)?,
            lab: Regex::new(&source.lab)?,
            assignment: Regex::new(&source.assignment)?,
            project: Regex::new(&source.project)?,
            due_phrase: Regex::new(&source.due_phrase)?,
            date: Regex::new(&source.date)?,
            week_label: Regex::new(&source.week_label)?,
            week_item: Regex::new(&source.week_item)?,
            time_of_day: Regex::new(&source.time_of_day)?,
            windows: source.windows,
        })
    }

    /// The English syllabus rule set.
    pub fn standard() -> Result<Self, regex::Error> {
        Self::compile(&RuleSource::default())
    }
}
