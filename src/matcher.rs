use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use crate::accounts::AliasTable;
use crate::log::{Level, RunLog};
use crate::schedule::{EntryId, ScheduleIndex};

/// Why a recording could not be matched. Every variant is recoverable;
/// the batch logs it and moves on to the next recording.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchFailure {
    #[error("recording title {0:?} does not parse")]
    MalformedTitle(String),
    #[error("account id {0:?} is neither an alias nor a canonical code")]
    UnresolvedIdentifier(String),
    #[error("no session within tolerance")]
    NoMatch,
}

/// Account label and UTC capture instant taken from a recording title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingCandidate {
    pub account_id: String,
    pub captured_at: DateTime<Utc>,
}

/// Parses a recording title of the shape the meeting host generates:
/// `<account> <XXXYYYYMMDD> <HHMMSS> <free text…>`, e.g.
/// `Z09 GMT20220812 183013 Robotics L2`. The second token carries a
/// 3-letter prefix before the date digits; the clock is UTC.
pub fn parse_recording_title(title: &str) -> Result<RecordingCandidate, MatchFailure> {
    let malformed = || MatchFailure::MalformedTitle(title.to_string());

    let tokens: Vec<&str> = title.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(malformed());
    }
    let stamp = tokens[1].as_bytes();
    let clock = tokens[2].as_bytes();
    if stamp.len() < 11 || !stamp[3..].iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    if clock.len() < 6 || !clock.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }

    let date = NaiveDate::from_ymd_opt(
        digits(&stamp[3..7]) as i32,
        digits(&stamp[7..9]),
        digits(&stamp[9..11]),
    )
    .ok_or_else(malformed)?;
    let time = NaiveTime::from_hms_opt(
        digits(&clock[0..2]),
        digits(&clock[2..4]),
        digits(&clock[4..6]),
    )
    .ok_or_else(malformed)?;

    Ok(RecordingCandidate {
        account_id: tokens[0].to_string(),
        captured_at: date.and_time(time).and_utc(),
    })
}

/// Callers verify the bytes are ASCII digits first.
fn digits(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
}

/// Finds the session a recording belongs to: same canonical account id,
/// scheduled start within `tolerance_minutes` of the capture instant.
/// When several sessions qualify, the one with the closest start wins;
/// equal distances keep the earlier one in load order.
pub fn find_match(
    index: &ScheduleIndex,
    aliases: &AliasTable,
    account_id: &str,
    captured_at: DateTime<Utc>,
    tolerance_minutes: i64,
    log: &dyn RunLog,
) -> Result<EntryId, MatchFailure> {
    let Some(wanted) = aliases.resolve(account_id) else {
        log.emit(
            Level::Warning,
            &format!(
                "account id {:?} is neither an alias nor a canonical code",
                account_id
            ),
        );
        return Err(MatchFailure::UnresolvedIdentifier(account_id.to_string()));
    };

    let tolerance = Duration::minutes(tolerance_minutes);
    let mut best: Option<(EntryId, Duration)> = None;
    let mut hits = 0usize;
    for (id, entry) in index.iter_ids() {
        if aliases.canonicalize(&entry.account_raw) != wanted {
            continue;
        }
        let offset = captured_at.signed_duration_since(entry.start).abs();
        if offset > tolerance {
            continue;
        }
        hits += 1;
        let closer = match &best {
            Some((_, best_offset)) => offset < *best_offset,
            None => true,
        };
        if closer {
            best = Some((id, offset));
        }
    }

    match best {
        Some((id, _)) => {
            if hits > 1 {
                let entry = index.entry(id);
                log.emit(
                    Level::Warning,
                    &format!(
                        "{} sessions within {} min for account {}; keeping class {} at {}",
                        hits,
                        tolerance_minutes,
                        wanted,
                        entry.class_id,
                        entry.start.format("%Y-%m-%d %H:%M")
                    ),
                );
            }
            Ok(id)
        }
        None => {
            log.emit(
                Level::Info,
                &format!(
                    "no session within {} min of {} for account {}",
                    tolerance_minutes,
                    captured_at.format("%Y-%m-%d %H:%M:%S"),
                    wanted
                ),
            );
            Err(MatchFailure::NoMatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use crate::schedule::ScheduleRow;
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn new_york() -> Tz {
        "America/New_York".parse().unwrap()
    }

    fn row(class_id: &str, date: &str, start: &str, end: &str, account: &str) -> ScheduleRow {
        ScheduleRow {
            class_date: date.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            class_name: format!("Class {}", class_id),
            class_id: class_id.to_string(),
            teacher_name: "Pat Doe".to_string(),
            account_id: account.to_string(),
            ..ScheduleRow::default()
        }
    }

    fn index_of(rows: Vec<ScheduleRow>) -> ScheduleIndex {
        ScheduleIndex::load(rows, &AliasTable::builtin(), new_york(), &MemoryLog::new())
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_recording_title() {
        let candidate =
            parse_recording_title("Z09 GMT20220812 183013 Robotics L2 extra words").unwrap();
        assert_eq!(candidate.account_id, "Z09");
        assert_eq!(candidate.captured_at, utc(2022, 8, 12, 18, 30, 13));

        let candidate =
            parse_recording_title("z9@thinklandai.com GMT20221106 013000 Scratch").unwrap();
        assert_eq!(candidate.account_id, "z9@thinklandai.com");
        assert_eq!(candidate.captured_at, utc(2022, 11, 6, 1, 30, 0));
    }

    #[test]
    fn test_parse_rejects_malformed_titles() {
        for title in [
            "",
            "Z09 GMT20220812",
            "Z09 GMT2022081 183013",
            "Z09 GMT2022O812 183013",
            "Z09 GMT20220812 18301",
            "Z09 GMT20220812 18301x",
            "Z09 GMT20221345 183013",
            "Z09 GMT20220812 256161",
        ] {
            match parse_recording_title(title) {
                Err(MatchFailure::MalformedTitle(t)) => assert_eq!(t, title),
                other => panic!("expected malformed for {:?}, got {:?}", title, other),
            }
        }
    }

    #[test]
    fn test_longer_digit_runs_still_parse() {
        // The host appends nothing after HHMMSS, but tolerate extra digits.
        let candidate = parse_recording_title("Z09 GMT202208121 1830139 tail").unwrap();
        assert_eq!(candidate.captured_at, utc(2022, 8, 12, 18, 30, 13));
    }

    #[test]
    fn test_match_within_tolerance() {
        let log = MemoryLog::new();
        let index = index_of(vec![row(
            "AI005-36",
            "2022-08-12",
            "14:30:00",
            "16:00:00",
            "z9@thinklandai.com",
        )]);
        // 14:30 eastern daylight time is 18:30 UTC; the capture is one
        // minute later.
        let id = find_match(
            &index,
            &AliasTable::builtin(),
            "Z09",
            utc(2022, 8, 12, 18, 31, 0),
            15,
            &log,
        )
        .unwrap();
        assert_eq!(index.entry(id).class_id, "AI005-36");
        assert!(log.at_least(Level::Warning).is_empty());
    }

    #[test]
    fn test_alias_account_matches_canonical_entry() {
        let log = MemoryLog::new();
        let index = index_of(vec![row(
            "AI005-36",
            "2022-08-12",
            "14:30:00",
            "16:00:00",
            "Z09",
        )]);
        let id = find_match(
            &index,
            &AliasTable::builtin(),
            "z9@thinklandai.com",
            utc(2022, 8, 12, 18, 30, 13),
            15,
            &log,
        )
        .unwrap();
        assert_eq!(index.entry(id).class_id, "AI005-36");
    }

    #[test]
    fn test_exact_start_matches_at_zero_tolerance() {
        let log = MemoryLog::new();
        let index = index_of(vec![row(
            "AI005-36",
            "2022-08-12",
            "14:30:00",
            "16:00:00",
            "Z09",
        )]);
        let id = find_match(
            &index,
            &AliasTable::builtin(),
            "Z09",
            utc(2022, 8, 12, 18, 30, 0),
            0,
            &log,
        )
        .unwrap();
        assert_eq!(index.entry(id).class_id, "AI005-36");
    }

    #[test]
    fn test_zero_tolerance_rejects_offset_capture() {
        let log = MemoryLog::new();
        let index = index_of(vec![row(
            "AI005-36",
            "2022-08-12",
            "14:30:00",
            "16:00:00",
            "Z09",
        )]);
        let err = find_match(
            &index,
            &AliasTable::builtin(),
            "Z09",
            utc(2022, 8, 12, 18, 32, 0),
            0,
            &log,
        )
        .unwrap_err();
        assert_eq!(err, MatchFailure::NoMatch);
    }

    #[test]
    fn test_wrong_account_does_not_match() {
        let log = MemoryLog::new();
        let index = index_of(vec![row(
            "AI005-36",
            "2022-08-12",
            "14:30:00",
            "16:00:00",
            "Z08",
        )]);
        let err = find_match(
            &index,
            &AliasTable::builtin(),
            "Z09",
            utc(2022, 8, 12, 18, 30, 0),
            15,
            &log,
        )
        .unwrap_err();
        assert_eq!(err, MatchFailure::NoMatch);
    }

    #[test]
    fn test_unresolved_account_fails_early() {
        let log = MemoryLog::new();
        let index = index_of(Vec::new());
        let err = find_match(
            &index,
            &AliasTable::builtin(),
            "whoever@nowhere.example",
            utc(2022, 8, 12, 18, 30, 0),
            15,
            &log,
        )
        .unwrap_err();
        assert_eq!(
            err,
            MatchFailure::UnresolvedIdentifier("whoever@nowhere.example".to_string())
        );
        assert_eq!(log.at_least(Level::Warning).len(), 1);
    }

    #[test]
    fn test_closest_session_wins() {
        let log = MemoryLog::new();
        let index = index_of(vec![
            row("AI005-36", "2022-08-12", "14:00:00", "15:00:00", "Z09"),
            row("SC101-01", "2022-08-12", "15:00:00", "16:00:00", "Z09"),
        ]);
        // 18:40 UTC sits 40 minutes after the first start, 20 before the
        // second.
        let id = find_match(
            &index,
            &AliasTable::builtin(),
            "Z09",
            utc(2022, 8, 12, 18, 40, 0),
            60,
            &log,
        )
        .unwrap();
        assert_eq!(index.entry(id).class_id, "SC101-01");
        let warnings = log.at_least(Level::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("2 sessions"));
        assert!(warnings[0].contains("SC101-01"));
    }

    #[test]
    fn test_equal_distance_keeps_load_order() {
        let log = MemoryLog::new();
        let index = index_of(vec![
            row("AI005-36", "2022-08-12", "14:00:00", "15:00:00", "Z09"),
            row("SC101-01", "2022-08-12", "15:00:00", "16:00:00", "Z09"),
        ]);
        // 18:30 UTC is exactly 30 minutes from both starts.
        let id = find_match(
            &index,
            &AliasTable::builtin(),
            "Z09",
            utc(2022, 8, 12, 18, 30, 0),
            60,
            &log,
        )
        .unwrap();
        assert_eq!(index.entry(id).class_id, "AI005-36");
    }

    #[test]
    fn test_alias_update_applies_without_reload() {
        let log = MemoryLog::new();
        let rows = vec![row(
            "AI005-36",
            "2022-08-12",
            "14:30:00",
            "16:00:00",
            "newcam@example.com",
        )];
        let index = ScheduleIndex::load(rows, &AliasTable::builtin(), new_york(), &log);

        // The stock table does not know the entry's account.
        let err = find_match(
            &index,
            &AliasTable::builtin(),
            "Z09",
            utc(2022, 8, 12, 18, 30, 0),
            15,
            &log,
        )
        .unwrap_err();
        assert_eq!(err, MatchFailure::NoMatch);

        // An extended table resolves it against the same index.
        let mut extended = AliasTable::builtin();
        extended.insert("newcam@example.com".to_string(), "Z09".to_string());
        let id = find_match(
            &index,
            &extended,
            "Z09",
            utc(2022, 8, 12, 18, 30, 0),
            15,
            &log,
        )
        .unwrap();
        assert_eq!(index.entry(id).class_id, "AI005-36");
    }
}
