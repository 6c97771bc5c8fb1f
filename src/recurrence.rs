use std::str::FromStr;

use anyhow::{anyhow, Context};
use chrono::{Datelike, DateTime, Days, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;

/// A weekly slot: weekday plus wall-clock start and end times, as written
/// in schedule documents (`Fri 19:00-20:00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl FromStr for WeekWindow {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (day, times) = s
            .trim()
            .split_once(' ')
            .with_context(|| format!("expected \"<weekday> <start>-<end>\", got {:?}", s))?;
        let (start, end) = times
            .split_once('-')
            .with_context(|| format!("expected \"<start>-<end>\" times in {:?}", s))?;
        let weekday = day
            .parse::<Weekday>()
            .map_err(|_| anyhow!("unrecognized weekday {:?}", day))?;
        let start = parse_time(start)?;
        let end = parse_time(end)?;
        if start >= end {
            return Err(anyhow!("start {} is not before end {}", start, end));
        }
        Ok(Self { weekday, start, end })
    }
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub(crate) fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| anyhow!("unrecognized time {:?}", s))
}

/// Parses a `MM/DD/YYYY-MM/DD/YYYY` date range.
pub fn parse_date_range(s: &str) -> anyhow::Result<(NaiveDate, NaiveDate)> {
    let (first, last) = s
        .split_once('-')
        .with_context(|| format!("expected \"<first>-<last>\" dates, got {:?}", s))?;
    let first = NaiveDate::parse_from_str(first.trim(), "%m/%d/%Y")
        .map_err(|_| anyhow!("unrecognized date {:?}", first.trim()))?;
    let last = NaiveDate::parse_from_str(last.trim(), "%m/%d/%Y")
        .map_err(|_| anyhow!("unrecognized date {:?}", last.trim()))?;
    Ok((first, last))
}

/// Expands a recurring class into individual occurrences, one per 7-day
/// step: the first on or after `first`, the last on or before `last`.
/// Start and end are wall-clock times in `zone`, so a class keeps its
/// local hour across daylight-saving transitions.
pub fn expand(
    first: NaiveDate,
    last: NaiveDate,
    window: &WeekWindow,
    zone: Tz,
) -> Vec<(DateTime<Tz>, DateTime<Tz>)> {
    let mut out = Vec::new();
    let mut date = match first_on_or_after(first, window.weekday) {
        Some(date) => date,
        None => return out,
    };
    while date <= last {
        out.push((
            zoned(date, window.start, zone),
            zoned(date, window.end, zone),
        ));
        date = match date.checked_add_days(Days::new(7)) {
            Some(next) => next,
            None => break,
        };
    }
    out
}

fn first_on_or_after(date: NaiveDate, weekday: Weekday) -> Option<NaiveDate> {
    let ahead = (7 + weekday.num_days_from_monday() - date.weekday().num_days_from_monday()) % 7;
    date.checked_add_days(Days::new(u64::from(ahead)))
}

/// Resolves a wall-clock time in `zone`. A time inside a spring-forward
/// gap shifts ahead one hour; an ambiguous fall-back time takes the
/// earlier of the two instants.
pub(crate) fn zoned(date: NaiveDate, time: NaiveTime, zone: Tz) -> DateTime<Tz> {
    let naive = date.and_time(time);
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            match zone.from_local_datetime(&shifted) {
                LocalResult::Single(instant) => instant,
                LocalResult::Ambiguous(earlier, _) => earlier,
                LocalResult::None => zone.from_utc_datetime(&shifted),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_york() -> Tz {
        "America/New_York".parse().unwrap()
    }

    #[test]
    fn test_window_parsing() {
        let window: WeekWindow = "Fri 19:00-20:00".parse().unwrap();
        assert_eq!(window.weekday, Weekday::Fri);
        assert_eq!(window.start, NaiveTime::from_hms_opt(19, 0, 0).unwrap());
        assert_eq!(window.end, NaiveTime::from_hms_opt(20, 0, 0).unwrap());

        let window: WeekWindow = "sun 09:30:15-11:00:00".parse().unwrap();
        assert_eq!(window.weekday, Weekday::Sun);
        assert_eq!(window.start.second(), 15);

        assert!("Fri 20:00-19:00".parse::<WeekWindow>().is_err());
        assert!("Fri 19:00".parse::<WeekWindow>().is_err());
        assert!("Someday 19:00-20:00".parse::<WeekWindow>().is_err());
    }

    #[test]
    fn test_date_range_parsing() {
        let (first, last) = parse_date_range("09/16/2022-01/13/2023").unwrap();
        assert_eq!(first, date(2022, 9, 16));
        assert_eq!(last, date(2023, 1, 13));
        assert!(parse_date_range("09/16/2022").is_err());
        assert!(parse_date_range("2022-09-16-2023-01-13").is_err());
    }

    #[test]
    fn test_expand_weekly_run() {
        let window: WeekWindow = "Fri 19:00-20:00".parse().unwrap();
        let dates = expand(date(2022, 9, 16), date(2023, 1, 13), &window, new_york());

        assert_eq!(dates.len(), 18);
        let (first_start, first_end) = dates[0];
        assert_eq!(first_start.date_naive(), date(2022, 9, 16));
        assert_eq!(first_end.signed_duration_since(first_start), Duration::hours(1));
        let (last_start, _) = dates[dates.len() - 1];
        assert_eq!(last_start.date_naive(), date(2023, 1, 13));
        for (start, _) in &dates {
            assert_eq!(start.date_naive().weekday(), Weekday::Fri);
            assert_eq!(start.time(), NaiveTime::from_hms_opt(19, 0, 0).unwrap());
        }
        for pair in dates.windows(2) {
            let days = pair[1].0.date_naive() - pair[0].0.date_naive();
            assert_eq!(days, Duration::days(7));
        }
    }

    #[test]
    fn test_expand_aligns_to_weekday() {
        // Range opens on a Wednesday; the first Friday is two days later.
        let window: WeekWindow = "Fri 19:00-20:00".parse().unwrap();
        let dates = expand(date(2022, 9, 14), date(2022, 9, 30), &window, new_york());
        assert_eq!(dates.len(), 3);
        assert_eq!(dates[0].0.date_naive(), date(2022, 9, 16));
    }

    #[test]
    fn test_expand_empty_when_no_weekday_in_range() {
        let window: WeekWindow = "Fri 19:00-20:00".parse().unwrap();
        let dates = expand(date(2022, 9, 17), date(2022, 9, 19), &window, new_york());
        assert!(dates.is_empty());
    }

    #[test]
    fn test_expand_keeps_local_hour_across_dst() {
        // US fall-back on 2022-11-06: the Friday before is EDT, the one
        // after is EST, and both keep the 19:00 wall clock.
        let window: WeekWindow = "Fri 19:00-20:00".parse().unwrap();
        let dates = expand(date(2022, 11, 4), date(2022, 11, 11), &window, new_york());

        assert_eq!(dates.len(), 2);
        let (before, after) = (dates[0].0, dates[1].0);
        assert_eq!(before.time(), NaiveTime::from_hms_opt(19, 0, 0).unwrap());
        assert_eq!(after.time(), NaiveTime::from_hms_opt(19, 0, 0).unwrap());
        assert_eq!(
            before.with_timezone(&Utc).time(),
            NaiveTime::from_hms_opt(23, 0, 0).unwrap()
        );
        assert_eq!(
            after.with_timezone(&Utc).time(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
        // The UTC gap is a week plus the fall-back hour.
        assert_eq!(
            after.signed_duration_since(before),
            Duration::days(7) + Duration::hours(1)
        );
    }

    #[test]
    fn test_gap_time_shifts_forward() {
        // 2022-03-13 02:30 does not exist in New York; spring-forward
        // pushes it to 03:30 EDT.
        let instant = zoned(
            date(2022, 3, 13),
            NaiveTime::from_hms_opt(2, 30, 0).unwrap(),
            new_york(),
        );
        assert_eq!(instant.time(), NaiveTime::from_hms_opt(3, 30, 0).unwrap());
    }

    #[test]
    fn test_ambiguous_time_takes_earlier_instant() {
        // 2022-11-06 01:30 happens twice in New York; the EDT reading
        // comes first.
        let instant = zoned(
            date(2022, 11, 6),
            NaiveTime::from_hms_opt(1, 30, 0).unwrap(),
            new_york(),
        );
        assert_eq!(
            instant.with_timezone(&Utc).time(),
            NaiveTime::from_hms_opt(5, 30, 0).unwrap()
        );
    }
}
