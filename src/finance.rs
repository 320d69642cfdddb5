use chrono::{Datelike, NaiveDate, Utc};

/// Every date crosses the IPC boundary as a plain calendar date. One parser,
/// applied identically by every handler, so entities never skew.
pub fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Schedule status shown to the UI. Stored "paid" always wins; otherwise the
/// status is derived from the due date at read time and never written back.
pub fn derived_schedule_status(stored: &str, due_date: &str, today: NaiveDate) -> String {
    if stored == "paid" {
        return "paid".to_string();
    }
    match parse_calendar_date(due_date) {
        Some(due) if due < today => "overdue".to_string(),
        _ => stored.to_string(),
    }
}

/// Month bucket (1..=12) for a ledger date in the given year, if it falls in
/// that year.
pub fn month_bucket(date: &str, year: i32) -> Option<u32> {
    let d = parse_calendar_date(date)?;
    if d.year() == year {
        Some(d.month())
    } else {
        None
    }
}
