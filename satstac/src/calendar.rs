//! Text calendars highlighting labelled dates, e.g. scene acquisition days.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use chrono::{Datelike as _, Days, Months, NaiveDate};

use crate::errors::{StacError, StacResult};

/// Every month is drawn with this many week rows.
const WEEKS_PER_MONTH: usize = 6;
const MONTH_WIDTH: usize = 20;
const FIRST_COLOR: usize = 41;
const DAY_HEADER: &str = "Mo Tu We Th Fr Sa Su";

pub type Week = [NaiveDate; 7];

/// One month, as Monday-first weeks that may include days of adjacent months.
#[derive(Clone, Debug, PartialEq)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<Week>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalendarYear {
    pub year: i32,
    /// Rows of `cols` consecutive months
    pub rows: Vec<Vec<CalendarMonth>>,
}

impl CalendarMonth {
    fn new(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
        let offset = u64::from(first.weekday().num_days_from_monday());
        let mut start = first.checked_sub_days(Days::new(offset))?;
        let mut weeks = Vec::new();
        while start <= last {
            let week: Vec<NaiveDate> = start.iter_days().take(7).collect();
            weeks.push(week.try_into().ok()?);
            start = start.checked_add_days(Days::new(7))?;
        }
        Some(Self { year, month, weeks })
    }

    #[must_use]
    pub fn name(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%B").to_string())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

fn check_cols(cols: usize) -> StacResult<u32> {
    match u32::try_from(cols) {
        Ok(v @ 1..=12) => Ok(v),
        _ => Err(StacError::InvalidCalendarWidth(cols)),
    }
}

fn year_rows(year: i32, cols: u32) -> Vec<Vec<CalendarMonth>> {
    let months: Vec<CalendarMonth> = (1..=12)
        .filter_map(|m| CalendarMonth::new(year, m))
        .collect();
    months.chunks(cols as usize).map(<[_]>::to_vec).collect()
}

/// Calendar grid covering `start..=end`.
///
/// Years are split into rows of `cols` months. The first year starts at the
/// row holding `start`, the last year stops after the row holding `end`.
pub fn calendar_dates(start: NaiveDate, end: NaiveDate, cols: usize) -> StacResult<Vec<CalendarYear>> {
    let cols = check_cols(cols)?;
    let first_row = ((start.month() - 1) / cols) as usize;
    let last_row = ((end.month() - 1) / cols + 1) as usize;

    Ok((start.year()..=end.year())
        .map(|year| {
            let mut rows = year_rows(year, cols);
            if year == end.year() {
                rows.truncate(last_row);
            }
            if year == start.year() {
                rows.drain(..first_row.min(rows.len()));
            }
            CalendarYear { year, rows }
        })
        .collect())
}

/// Parse a `DATE=LABEL` pair. Without `=`, the label is `date`.
pub fn parse_date_label(value: &str) -> StacResult<(NaiveDate, String)> {
    let (date, label) = value.split_once('=').unwrap_or((value, "date"));
    let parsed = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| StacError::InvalidDate(date.to_string()))?;
    Ok((parsed, label.trim().to_string()))
}

/// Render a calendar covering all `dates`, with each date coloured by its
/// label, followed by a legend.
///
/// Labels get ANSI background colours `41`, `42`, ... in alphabetical order.
pub fn text_calendar(dates: &BTreeMap<NaiveDate, String>, cols: usize) -> StacResult<String> {
    let (Some((&first, _)), Some((&last, _))) = (dates.first_key_value(), dates.last_key_value()) else {
        return Err(StacError::EmptyCalendar);
    };
    let colors: BTreeMap<&str, usize> = dates
        .values()
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .zip(FIRST_COLOR..)
        .collect();

    let cal = calendar_dates(first, last, cols)?;
    let width = cols * (MONTH_WIDTH + 2) - 2;
    let mut out = String::new();
    for year in &cal {
        let _ = write!(out, "{:^width$}\n\n", year.year);
        for row in &year.rows {
            let names: Vec<String> = row.iter().map(|m| format!("{:^MONTH_WIDTH$}", m.name())).collect();
            let days = vec![format!("{DAY_HEADER:^MONTH_WIDTH$}"); row.len()];
            let _ = writeln!(out, "{}", names.join("  "));
            let _ = writeln!(out, "{}", days.join("  "));
            for week in 0..WEEKS_PER_MONTH {
                for month in row {
                    let cells: Vec<String> = match month.weeks.get(week) {
                        Some(days) => days.iter().map(|&d| day_cell(month, d, dates, &colors)).collect(),
                        None => vec!["  ".to_string(); 7],
                    };
                    let _ = write!(out, "{}  ", cells.join(" "));
                }
                out.push('\n');
            }
            out.push('\n');
        }
    }

    for (label, color) in &colors {
        let count = dates.values().filter(|v| v == label).count();
        let _ = writeln!(out, "\x1b[{color}m{label} ({count})\x1b[0m");
    }
    let _ = write!(out, "{} total dates", dates.len());
    Ok(out)
}

fn day_cell(
    month: &CalendarMonth,
    date: NaiveDate,
    dates: &BTreeMap<NaiveDate, String>,
    colors: &BTreeMap<&str, usize>,
) -> String {
    if !month.contains(date) {
        return "  ".to_string();
    }
    let day = format!("{:>2}", date.day());
    match dates.get(&date).and_then(|label| colors.get(label.as_str())) {
        Some(color) => format!("\x1b[{color}m{day}\x1b[0m"),
        None => day,
    }
}
