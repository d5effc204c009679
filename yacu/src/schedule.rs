//! Cron-style run schedule.
//!
//! Five fields (`minute hour day-of-month month day-of-week`) with `*`,
//! lists, ranges and steps, plus the usual `@daily`-style macros. When both
//! day fields are restricted a day matches if either one does.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use yacu_shared::errors::{YacuError, YacuResult};

/// Upper bound of the search for the next run. Covers leap-day schedules.
const SEARCH_DAYS: i64 = 366 * 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    /// Day-of-month field started with `*`.
    dom_any: bool,
    /// Day-of-week field started with `*`.
    dow_any: bool,
}

impl Schedule {
    pub fn parse(expr: &str) -> YacuResult<Self> {
        let expr = expr.trim();
        let expanded = match expr {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other if other.starts_with('@') => {
                return Err(invalid(expr, "unknown macro"));
            }
            other => other,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                expr,
                &format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let mut days_of_week = parse_field(fields[4], 0, 7).map_err(|e| invalid(expr, &e))?;
        // 7 is an alias for Sunday.
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            minutes: parse_field(fields[0], 0, 59).map_err(|e| invalid(expr, &e))?,
            hours: parse_field(fields[1], 0, 23).map_err(|e| invalid(expr, &e))?,
            days_of_month: parse_field(fields[2], 1, 31).map_err(|e| invalid(expr, &e))?,
            months: parse_field(fields[3], 1, 12).map_err(|e| invalid(expr, &e))?,
            days_of_week,
            dom_any: fields[2].starts_with('*'),
            dow_any: fields[4].starts_with('*'),
        })
    }

    /// Next matching minute strictly after `after`, in `after`'s time zone.
    ///
    /// Local times skipped by a DST jump never match; ambiguous ones resolve
    /// to the earlier instant.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let mut t = truncate_to_minute(after.naive_local())? + Duration::minutes(1);
        let limit = t + Duration::days(SEARCH_DAYS);

        while t <= limit {
            if !has(self.months, t.month()) {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !has(self.hours, t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if has(self.minutes, t.minute())
                && let Some(candidate) = tz.from_local_datetime(&t).earliest()
                && candidate > *after
            {
                return Some(candidate);
            }
            t += Duration::minutes(1);
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = has(self.days_of_month, date.day());
        let dow = has(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_any || self.dow_any {
            dom && dow
        } else {
            dom || dow
        }
    }
}

fn invalid(expr: &str, reason: &str) -> YacuError {
    YacuError::Config(format!("invalid interval '{}': {}", expr, reason))
}

fn has(set: u64, value: u32) -> bool {
    set & (1u64 << value) != 0
}

fn truncate_to_minute(t: NaiveDateTime) -> Option<NaiveDateTime> {
    t.with_second(0)?.with_nanosecond(0)
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

/// Parse one field into a bitset of allowed values in `min..=max`.
fn parse_field(field: &str, min: u32, max: u32) -> Result<u64, String> {
    let mut set = 0u64;
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = step
                    .parse::<u32>()
                    .map_err(|_| format!("bad step in '{}'", part))?;
                if step == 0 {
                    return Err(format!("zero step in '{}'", part));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, min, max)?, parse_value(b, min, max)?)
        } else {
            let value = parse_value(range, min, max)?;
            // `a/n` runs from a to the end of the field.
            (value, if step.is_some() { max } else { value })
        };
        if start > end {
            return Err(format!("descending range '{}'", range));
        }

        for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
            set |= 1u64 << value;
        }
    }
    Ok(set)
}

fn parse_value(raw: &str, min: u32, max: u32) -> Result<u32, String> {
    let value = raw
        .parse::<u32>()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    if !(min..=max).contains(&value) {
        return Err(format!("{} is outside {}-{}", value, min, max));
    }
    Ok(value)
}
