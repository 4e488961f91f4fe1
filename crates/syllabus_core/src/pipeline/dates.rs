//! crates/syllabus_core/src/pipeline/dates.rs
//!
//! Resolves the textual date tokens kept by extraction ("3/14", "March 14",
//! "12.1", "4/2/2025") into calendar dates within a class term.

use chrono::{Datelike, Duration, NaiveDate};

/// A date this many days before the term start is assumed to belong to the next year.
const TERM_ROLLOVER_DAYS: i64 = 30;

pub fn resolve_date(token: &str, term_start: NaiveDate) -> Option<NaiveDate> {
    let token = token.trim();
    let (month, day, year) = parse_numeric(token).or_else(|| parse_month_name(token))?;

    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let candidate = NaiveDate::from_ymd_opt(term_start.year(), month, day)?;
            if candidate < term_start - Duration::days(TERM_ROLLOVER_DAYS) {
                NaiveDate::from_ymd_opt(term_start.year() + 1, month, day)
            } else {
                Some(candidate)
            }
        }
    }
}

fn parse_numeric(token: &str) -> Option<(u32, u32, Option<i32>)> {
    let parts: Vec<&str> = token.split(['/', '.']).collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    let month = parts[0].parse::<u32>().ok()?;
    let day = parts[1].parse::<u32>().ok()?;
    let year = match parts.get(2) {
        Some(y) if y.len() == 2 => Some(2000 + y.parse::<i32>().ok()?),
        Some(y) if y.len() == 4 => Some(y.parse::<i32>().ok()?),
        Some(_) => return None,
        None => None,
    };
    Some((month, day, year))
}

fn parse_month_name(token: &str) -> Option<(u32, u32, Option<i32>)> {
    let mut words = token.split_whitespace();
    let name = words.next()?.trim_end_matches('.').to_lowercase();
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    let day: String = words.next()?.chars().take_while(|c| c.is_ascii_digit()).collect();
    Some((month, day.parse().ok()?, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spring() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 13).unwrap()
    }

    fn fall() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 25).unwrap()
    }

    #[test]
    fn numeric_forms() {
        assert_eq!(resolve_date("3/14", spring()), NaiveDate::from_ymd_opt(2025, 3, 14));
        assert_eq!(resolve_date("3.14", spring()), NaiveDate::from_ymd_opt(2025, 3, 14));
        assert_eq!(resolve_date("4/2/26", spring()), NaiveDate::from_ymd_opt(2026, 4, 2));
        assert_eq!(resolve_date("4/2/2024", spring()), NaiveDate::from_ymd_opt(2024, 4, 2));
    }

    #[test]
    fn month_names() {
        assert_eq!(resolve_date("March 21st", spring()), NaiveDate::from_ymd_opt(2025, 3, 21));
        assert_eq!(resolve_date("Sept. 3", fall()), NaiveDate::from_ymd_opt(2025, 9, 3));
    }

    #[test]
    fn fall_term_rolls_january_into_next_year() {
        assert_eq!(resolve_date("1/10", fall()), NaiveDate::from_ymd_opt(2026, 1, 10));
        assert_eq!(resolve_date("8/20", fall()), NaiveDate::from_ymd_opt(2025, 8, 20));
    }

    #[test]
    fn impossible_dates_are_rejected() {
        assert_eq!(resolve_date("13/40", spring()), None);
        assert_eq!(resolve_date("Smarch 3", spring()), None);
        assert_eq!(resolve_date("2/30", spring()), None);
    }
}
