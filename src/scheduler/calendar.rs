//! Weekly slot arithmetic
//!
//! A slot is a weekday and wall-clock time in a fixed UTC offset. The
//! scheduler only ever asks two questions: when is the next slot strictly
//! after now, and what label identifies a given slot in the cycle ledger.

use crate::ConfigError;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use std::fmt;

/// A recurring weekly point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySlot {
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

impl WeeklySlot {
    /// Parses a day name, an `HH:MM` time and a timezone
    ///
    /// The timezone is either `UTC` or a fixed `±HH:MM` offset; region
    /// names are rejected.
    pub fn parse(day: &str, time: &str, timezone: &str) -> Result<Self, ConfigError> {
        let weekday = parse_weekday(day).ok_or_else(|| {
            ConfigError::InvalidSchedule(format!("unknown day of week '{}'", day))
        })?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| {
            ConfigError::InvalidSchedule(format!("time must be HH:MM, got '{}'", time))
        })?;
        let offset = parse_offset(timezone).ok_or_else(|| {
            ConfigError::InvalidSchedule(format!(
                "timezone must be UTC or a fixed offset like -03:00, got '{}'",
                timezone
            ))
        })?;

        Ok(Self {
            weekday,
            time,
            offset,
        })
    }

    /// The first slot strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.offset).date_naive();
        let days_ahead = (7 + self.weekday.num_days_from_monday()
            - today.weekday().num_days_from_monday())
            % 7;
        let candidate = self.at(today + Duration::days(days_ahead as i64));
        if candidate > now {
            candidate
        } else {
            candidate + Duration::weeks(1)
        }
    }

    /// The latest slot at or before `now`
    pub fn previous_at_or_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_after(now) - Duration::weeks(1)
    }

    /// Ledger label of the slot starting at `at`, in local time
    pub fn label(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset)
            .format("%Y-%m-%dT%H:%M%:z")
            .to_string()
    }

    fn at(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(self.time);
        let utc = local - Duration::seconds(self.offset.local_minus_utc() as i64);
        Utc.from_utc_datetime(&utc)
    }
}

impl fmt::Display for WeeklySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.weekday, self.time.format("%H:%M"), self.offset)
    }
}

/// English names (full or abbreviated) and Portuguese names
fn parse_weekday(day: &str) -> Option<Weekday> {
    let day = day.trim().to_lowercase();
    if let Ok(weekday) = day.parse::<Weekday>() {
        return Some(weekday);
    }
    match day.trim_end_matches("-feira") {
        "segunda" => Some(Weekday::Mon),
        "terça" | "terca" => Some(Weekday::Tue),
        "quarta" => Some(Weekday::Wed),
        "quinta" => Some(Weekday::Thu),
        "sexta" => Some(Weekday::Fri),
        "sábado" | "sabado" => Some(Weekday::Sat),
        "domingo" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_offset(timezone: &str) -> Option<FixedOffset> {
    let tz = timezone.trim();
    if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
