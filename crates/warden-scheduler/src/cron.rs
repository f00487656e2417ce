//! # Cron Expression Matcher
//!
//! Five-field cron (`minute hour day-of-month month day-of-week`) with
//! `*`, integers, ranges `a-b`, lists `x,y,z`, and steps `expr/k`. Each
//! field parses to a set; a clock matches when every field's set contains
//! the corresponding component.
//!
//! Day-of-week runs Sunday=0 through Saturday=6, with 7 accepted as an
//! alias for Sunday. Matching is minute-granular: seconds never
//! participate, so a coarse check tick decides firing and the caller
//! dedups by minute (see the scheduler's last-fired map).

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// One field's admitted values, as a bitmask (minutes fit in 60 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(&self, value: u8) -> bool {
        self.0 & (1u64 << value) != 0
    }
}

/// A parsed five-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronExpr {
    source: String,
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    day_of_week: FieldSet,
}

impl CronExpr {
    /// Parse an expression, validating field count and ranges.
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(expr, format!("expected 5 fields, got {}", fields.len())));
        }
        Ok(Self {
            source: expr.to_string(),
            minute: parse_field(fields[0], 0, 59).map_err(|r| invalid(expr, r))?,
            hour: parse_field(fields[1], 0, 23).map_err(|r| invalid(expr, r))?,
            day_of_month: parse_field(fields[2], 1, 31).map_err(|r| invalid(expr, r))?,
            month: parse_field(fields[3], 1, 12).map_err(|r| invalid(expr, r))?,
            day_of_week: parse_dow(fields[4]).map_err(|r| invalid(expr, r))?,
        })
    }

    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Does this expression match the given clock components?
    pub fn matches_parts(&self, minute: u8, hour: u8, dom: u8, month: u8, dow: u8) -> bool {
        self.minute.contains(minute)
            && self.hour.contains(hour)
            && self.day_of_month.contains(dom)
            && self.month.contains(month)
            && self.day_of_week.contains(dow % 7)
    }

    /// Does this expression match a zoned timestamp (minute granularity)?
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        self.matches_parts(
            at.minute() as u8,
            at.hour() as u8,
            at.day() as u8,
            at.month() as u8,
            at.weekday().num_days_from_sunday() as u8,
        )
    }
}

fn invalid(expr: &str, reason: String) -> SchedulerError {
    SchedulerError::InvalidCron {
        expr: expr.to_string(),
        reason,
    }
}

fn parse_dow(field: &str) -> Result<FieldSet, String> {
    // Parse with 7 admitted, then fold 7 onto 0 (both mean Sunday).
    let set = parse_field(field, 0, 7)?;
    let mut mask = set.0 & !(1u64 << 7);
    if set.contains(7) {
        mask |= 1;
    }
    Ok(FieldSet(mask))
}

fn parse_field(field: &str, min: u8, max: u8) -> Result<FieldSet, String> {
    if field.is_empty() {
        return Err("empty field".into());
    }
    let mut mask = 0u64;
    for part in field.split(',') {
        mask |= parse_part(part, min, max)?;
    }
    Ok(FieldSet(mask))
}

fn parse_part(part: &str, min: u8, max: u8) -> Result<u64, String> {
    let (base, step) = match part.split_once('/') {
        Some((base, step)) => {
            let step: u8 = step
                .parse()
                .map_err(|_| format!("bad step in '{part}'"))?;
            if step == 0 {
                return Err(format!("zero step in '{part}'"));
            }
            (base, step)
        }
        None => (part, 1),
    };

    let (start, end) = if base == "*" {
        (min, max)
    } else if let Some((a, b)) = base.split_once('-') {
        let a: u8 = a.parse().map_err(|_| format!("bad range start in '{part}'"))?;
        let b: u8 = b.parse().map_err(|_| format!("bad range end in '{part}'"))?;
        if a > b {
            return Err(format!("inverted range in '{part}'"));
        }
        (a, b)
    } else {
        let value: u8 = base.parse().map_err(|_| format!("bad value '{part}'"))?;
        // A bare value with a step means "from value to max" (cron
        // convention); without a step it is just the value.
        if step > 1 {
            (value, max)
        } else {
            (value, value)
        }
    };

    if start < min || end > max {
        return Err(format!("'{part}' outside {min}..={max}"));
    }

    let mut mask = 0u64;
    let mut v = start;
    while v <= end {
        mask |= 1u64 << v;
        match v.checked_add(step) {
            Some(next) => v = next,
            None => break,
        }
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_wildcard_matches_everything() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        assert!(expr.matches(&Utc::now()));
        assert!(expr.matches_parts(59, 23, 31, 12, 6));
    }

    #[test]
    fn test_fixed_minute_hour() {
        let expr = CronExpr::parse("30 14 * * *").unwrap();
        assert!(expr.matches_parts(30, 14, 1, 1, 0));
        assert!(!expr.matches_parts(31, 14, 1, 1, 0));
        assert!(!expr.matches_parts(30, 15, 1, 1, 0));
    }

    #[test]
    fn test_monday_morning() {
        // Monday 09:00 only.
        let expr = CronExpr::parse("0 9 * * 1").unwrap();
        // 2026-03-02 is a Monday.
        let monday = chrono::NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc();
        assert!(expr.matches(&monday));

        let tuesday = monday + chrono::Duration::days(1);
        assert!(!expr.matches(&tuesday));

        let nine_thirty = monday + chrono::Duration::minutes(30);
        assert!(!expr.matches(&nine_thirty));
    }

    #[test]
    fn test_ranges_and_lists() {
        let expr = CronExpr::parse("0-4,30 9-17 * * 1-5").unwrap();
        assert!(expr.matches_parts(2, 10, 5, 6, 3));
        assert!(expr.matches_parts(30, 17, 5, 6, 5));
        assert!(!expr.matches_parts(5, 10, 5, 6, 3));
        assert!(!expr.matches_parts(2, 8, 5, 6, 3));
        assert!(!expr.matches_parts(2, 10, 5, 6, 0));
    }

    #[test]
    fn test_steps() {
        let expr = CronExpr::parse("*/15 * * * *").unwrap();
        for minute in [0, 15, 30, 45] {
            assert!(expr.matches_parts(minute, 0, 1, 1, 0));
        }
        assert!(!expr.matches_parts(10, 0, 1, 1, 0));

        // Range with step.
        let expr = CronExpr::parse("10-30/10 * * * *").unwrap();
        assert!(expr.matches_parts(10, 0, 1, 1, 0));
        assert!(expr.matches_parts(20, 0, 1, 1, 0));
        assert!(expr.matches_parts(30, 0, 1, 1, 0));
        assert!(!expr.matches_parts(40, 0, 1, 1, 0));

        // Bare value with step runs to the field max.
        let expr = CronExpr::parse("5/20 * * * *").unwrap();
        assert!(expr.matches_parts(5, 0, 1, 1, 0));
        assert!(expr.matches_parts(25, 0, 1, 1, 0));
        assert!(expr.matches_parts(45, 0, 1, 1, 0));
        assert!(!expr.matches_parts(6, 0, 1, 1, 0));
    }

    #[test]
    fn test_sunday_aliases() {
        let zero = CronExpr::parse("0 0 * * 0").unwrap();
        let seven = CronExpr::parse("0 0 * * 7").unwrap();
        // 2026-03-01 is a Sunday.
        let sunday = chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert!(zero.matches(&sunday));
        assert!(seven.matches(&sunday));
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "a * * * *",
            "*/0 * * * *",
            "9-1 * * * *",
            "",
        ] {
            assert!(CronExpr::parse(bad).is_err(), "should reject {:?}", bad);
        }
    }

    #[test]
    fn test_field_membership_is_exact() {
        // Every matching clock has every component in its field set; spot
        // check a dense expression against brute force.
        let expr = CronExpr::parse("7,14,21 3 1,15 6 *").unwrap();
        for minute in 0..60u8 {
            for hour in 0..24u8 {
                let expected = [7u8, 14, 21].contains(&minute) && hour == 3;
                assert_eq!(expr.matches_parts(minute, hour, 15, 6, 2), expected);
            }
        }
        assert!(!expr.matches_parts(7, 3, 2, 6, 2));
        assert!(!expr.matches_parts(7, 3, 15, 7, 2));
    }
}
