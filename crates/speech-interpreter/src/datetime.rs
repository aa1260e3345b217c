//! `natural-datetime` grammar.
//!
//! Unlike the other grammars this one needs a reference point ("now", in the provider's
//! local timezone) to resolve relative phrases like "tomorrow" or "next Tuesday". That
//! reference is passed in explicitly by the caller rather than held as internal state, so
//! the grammar itself stays a pure function.
//!
//! Supported forms: `"tomorrow [morning|afternoon|evening|at H[:MM][am|pm]]"`,
//! `"next <weekday> [at H[:MM][am|pm]]"`, `"<weekday> at H am|pm"` (soonest occurrence,
//! today included), `"<month> <day>[st|nd|rd|th] [at ...]"`, `"the <day>th [at ...]"`,
//! a bare time (`needs_date = true`), and a bare date (`needs_time = true`).

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::{Outcome, Parsed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaturalDateTime {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl NaturalDateTime {
    pub fn needs_date(&self) -> bool {
        self.date.is_none()
    }

    pub fn needs_time(&self) -> bool {
        self.time.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.date.is_some() && self.time.is_some()
    }

    /// Combine into a concrete `NaiveDateTime` if both halves are present.
    pub fn combined(&self) -> Option<NaiveDateTime> {
        Some(NaiveDateTime::new(self.date?, self.time?))
    }
}

fn weekday_from_word(word: &str) -> Option<Weekday> {
    Some(match word.to_ascii_lowercase().as_str() {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    })
}

fn month_from_word(word: &str) -> Option<u32> {
    Some(match word.to_ascii_lowercase().as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    })
}

/// Parse a bucket word or an explicit clock time ("9", "9am", "9:30 pm", "14:00").
fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim().to_ascii_lowercase();
    match s.as_str() {
        "morning" => return NaiveTime::from_hms_opt(9, 0, 0),
        "afternoon" => return NaiveTime::from_hms_opt(14, 0, 0),
        "evening" => return NaiveTime::from_hms_opt(18, 0, 0),
        _ => {}
    }

    let (digits, meridiem) = if let Some(rest) = s.strip_suffix("am") {
        (rest.trim(), Some(true))
    } else if let Some(rest) = s.strip_suffix("pm") {
        (rest.trim(), Some(false))
    } else {
        (s.as_str(), None)
    };

    let (hour_str, minute_str) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None => (digits, "0"),
    };
    let hour: u32 = hour_str.trim().parse().ok()?;
    let minute: u32 = minute_str.trim().parse().ok()?;

    let hour24 = match meridiem {
        Some(true) => {
            if hour == 12 {
                0
            } else {
                hour
            }
        }
        Some(false) => {
            if hour == 12 {
                12
            } else {
                hour + 12
            }
        }
        None => hour,
    };

    NaiveTime::from_hms_opt(hour24, minute, 0)
}

/// Resolve the strictly-next occurrence of `target` relative to `today` — never today,
/// even if `today` is already `target`.
fn next_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let mut days_ahead = (7 + target.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;
    if days_ahead == 0 {
        days_ahead = 7;
    }
    today + chrono::Duration::days(days_ahead)
}

/// Resolve the soonest occurrence of `target`, including today.
fn this_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let days_ahead = (7 + target.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;
    today + chrono::Duration::days(days_ahead)
}

/// Parse `input` into a (possibly partial) date/time, resolved relative to `now`.
pub fn parse(input: &str, now: NaiveDateTime) -> Outcome<NaturalDateTime> {
    let normalized = input.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Outcome::Unparsable;
    }

    let (head, time_clause) = match normalized.split_once(" at ") {
        Some((h, t)) => (h.trim(), Some(t.trim())),
        None => (normalized.as_str(), None),
    };

    let today = now.date();
    let words: Vec<&str> = head.split_whitespace().collect();

    // "tomorrow [morning|afternoon|evening]"
    if words.first() == Some(&"tomorrow") {
        let date = today + chrono::Duration::days(1);
        let bucket_time = words.get(1).and_then(|w| parse_time_of_day(w));
        let time = time_clause.and_then(parse_time_of_day).or(bucket_time);
        return finish(date, time);
    }

    // "next <weekday>"
    if words.first() == Some(&"next") {
        if let Some(wd) = words.get(1).and_then(|w| weekday_from_word(w)) {
            let date = next_weekday(today, wd);
            let time = time_clause.and_then(parse_time_of_day);
            return finish(date, time);
        }
        return Outcome::Unparsable;
    }

    // "this <weekday>" or bare "<weekday>"
    if words.len() <= 2 {
        let weekday_word = if words.first() == Some(&"this") {
            words.get(1)
        } else {
            words.first()
        };
        if let Some(wd) = weekday_word.and_then(|w| weekday_from_word(w)) {
            let date = this_weekday(today, wd);
            let time = time_clause.and_then(parse_time_of_day);
            return finish(date, time);
        }
    }

    // "the <day>th" — day of the current (or next, if already passed) month
    if words.first() == Some(&"the") {
        if let Some(day_word) = words.get(1) {
            if let Some(day) = parse_ordinal_day(day_word) {
                if let Some(date) = resolve_month_day(today, today.month(), day) {
                    let time = time_clause.and_then(parse_time_of_day);
                    return finish(date, time);
                }
            }
        }
        return Outcome::Unparsable;
    }

    // "<month> <day>[st|nd|rd|th]"
    if let (Some(month_word), Some(day_word)) = (words.first(), words.get(1)) {
        if let (Some(month), Some(day)) = (month_from_word(month_word), parse_ordinal_day(day_word))
        {
            if let Some(date) = resolve_month_day(today, month, day) {
                let time = time_clause.and_then(parse_time_of_day);
                return finish(date, time);
            }
        }
    }

    // Bare time only, e.g. "at 2 pm" passed with no head — needs a date.
    if head.is_empty() {
        if let Some(time) = time_clause.and_then(parse_time_of_day) {
            return Outcome::Parsed(Parsed {
                token: NaturalDateTime {
                    date: None,
                    time: Some(time),
                },
                confidence: 0.9,
                alternatives: Vec::new(),
                needs_more: true,
            });
        }
    }

    // A bare time with no "at" keyword at all, e.g. "2 pm".
    if time_clause.is_none() {
        if let Some(time) = parse_time_of_day(head) {
            return Outcome::Parsed(Parsed {
                token: NaturalDateTime {
                    date: None,
                    time: Some(time),
                },
                confidence: 0.9,
                alternatives: Vec::new(),
                needs_more: true,
            });
        }
    }

    Outcome::Unparsable
}

fn parse_ordinal_day(word: &str) -> Option<u32> {
    let trimmed = word
        .trim_end_matches("st")
        .trim_end_matches("nd")
        .trim_end_matches("rd")
        .trim_end_matches("th");
    let day: u32 = trimmed.parse().ok()?;
    if (1..=31).contains(&day) {
        Some(day)
    } else {
        None
    }
}

/// Resolve a bare `(month, day)` against `today`, rolling to next year if that date has
/// already passed this year.
fn resolve_month_day(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}

fn finish(date: NaiveDate, time: Option<NaiveTime>) -> Outcome<NaturalDateTime> {
    let needs_more = time.is_none();
    Outcome::Parsed(Parsed {
        token: NaturalDateTime {
            date: Some(date),
            time,
        },
        confidence: 0.9,
        alternatives: Vec::new(),
        needs_more,
    })
}

/// Business-hours policy: 07:00 <= h < 18:00 local, Monday through Friday.
pub fn is_business_hours(dt: NaiveDateTime) -> bool {
    let weekday = dt.date().weekday();
    let is_weekday = !matches!(weekday, Weekday::Sat | Weekday::Sun);
    let hour = dt.time().hour_in_range();
    is_weekday && hour
}

trait HourInRange {
    fn hour_in_range(&self) -> bool;
}

impl HourInRange for NaiveTime {
    fn hour_in_range(&self) -> bool {
        use chrono::Timelike;
        (7..18).contains(&self.hour())
    }
}

/// A resolved datetime is valid for scheduling iff it is strictly in the future relative
/// to `now` and falls within business hours.
pub fn is_valid_for_scheduling(dt: NaiveDateTime, now: NaiveDateTime) -> bool {
    dt > now && is_business_hours(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        // A Wednesday.
        NaiveDate::from_ymd_opt(2026, 7, 29)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn tomorrow_morning() {
        let Outcome::Parsed(p) = parse("tomorrow morning", now()) else {
            panic!("expected parsed")
        };
        assert_eq!(p.token.date, NaiveDate::from_ymd_opt(2026, 7, 30));
        assert_eq!(p.token.time, NaiveTime::from_hms_opt(9, 0, 0));
    }

    #[test]
    fn next_tuesday_strictly_future() {
        // "now" is Wednesday 2026-07-29; next Tuesday must be 2026-08-04, not today.
        let Outcome::Parsed(p) = parse("next tuesday at 10 am", now()) else {
            panic!("expected parsed")
        };
        assert_eq!(p.token.date, NaiveDate::from_ymd_opt(2026, 8, 4));
        assert_eq!(p.token.time, NaiveTime::from_hms_opt(10, 0, 0));
    }

    #[test]
    fn next_wednesday_skips_today() {
        let Outcome::Parsed(p) = parse("next wednesday at 9am", now()) else {
            panic!("expected parsed")
        };
        // today is wednesday 2026-07-29; "next wednesday" must be 2026-08-05.
        assert_eq!(p.token.date, NaiveDate::from_ymd_opt(2026, 8, 5));
    }

    #[test]
    fn bare_time_needs_date() {
        let Outcome::Parsed(p) = parse("at 2 pm", now()) else {
            panic!("expected parsed")
        };
        assert!(p.needs_more);
        assert!(p.token.needs_date());
    }

    #[test]
    fn bare_date_needs_time() {
        let Outcome::Parsed(p) = parse("next friday", now()) else {
            panic!("expected parsed")
        };
        assert!(p.needs_more);
        assert!(p.token.needs_time());
    }

    #[test]
    fn weekend_fails_business_hours() {
        let saturday = NaiveDate::from_ymd_opt(2026, 8, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert!(!is_business_hours(saturday));
    }

    #[test]
    fn past_datetime_is_invalid() {
        let past = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert!(!is_valid_for_scheduling(past, now()));
    }
}
