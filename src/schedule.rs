use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::accounts::AliasTable;
use crate::log::{Level, RunLog};
use crate::recurrence::{self, parse_date_range, parse_time, zoned, WeekWindow};

/// One row of the schedule source document, with the column names the
/// org's sheet uses. Rows round-trip as a JSON array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleRow {
    #[serde(rename = "Class Date")]
    pub class_date: String,
    #[serde(rename = "Start Time", default)]
    pub start_time: String,
    #[serde(rename = "End Time", default)]
    pub end_time: String,
    #[serde(rename = "Class Name")]
    pub class_name: String,
    #[serde(rename = "Class ID")]
    pub class_id: String,
    #[serde(rename = "Teacher Name", default)]
    pub teacher_name: String,
    #[serde(rename = "Zoom ID", alias = "Account ID", default)]
    pub account_id: String,
    #[serde(rename = "Class Time", default, skip_serializing_if = "String::is_empty")]
    pub class_time: String,
    #[serde(rename = "Reported", default, skip_serializing_if = "String::is_empty")]
    pub reported: String,
    #[serde(rename = "YouTube Title", default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(
        rename = "YouTube Description",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub description: String,
    #[serde(
        rename = "YouTube Playlist Share URL",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub playlist_url: String,
    #[serde(rename = "Playlist", default, skip_serializing_if = "String::is_empty")]
    pub playlist: String,
    #[serde(rename = "Video", default, skip_serializing_if = "String::is_empty")]
    pub video: String,
    #[serde(rename = "YouTube URL", default, skip_serializing_if = "String::is_empty")]
    pub recording_url: String,
}

/// One scheduled class session, pinned to instants in the org's zone.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub class_name: String,
    pub class_id: String,
    pub teacher_name: String,
    /// Account id exactly as the source wrote it. The canonical form is
    /// computed on demand so alias-table fixes apply without a reload.
    pub account_raw: String,
    pub reported: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub playlist: Option<String>,
    pub video: Option<String>,
    pub recording_url: Option<String>,
}

impl ScheduleEntry {
    /// Canonical account id under `aliases`, or the raw value when the
    /// table does not know it.
    pub fn canonical_account<'a>(&'a self, aliases: &'a AliasTable) -> &'a str {
        aliases.canonicalize(&self.account_raw)
    }
}

/// Opaque handle to an entry, stable for the lifetime of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

/// All scheduled sessions of a run, in source order, deduplicated on
/// class id plus session date.
pub struct ScheduleIndex {
    entries: Vec<ScheduleEntry>,
    zone: Tz,
}

impl ScheduleIndex {
    /// Builds the index from source rows. Recurring rows (a `MM/DD/YYYY`
    /// date range plus a weekly `Class Time`) expand into one entry per
    /// occurrence. A later row with the same class id and date replaces
    /// the earlier one in place. Rows that do not parse are skipped with
    /// a warning; the load never fails as a whole.
    pub fn load(rows: Vec<ScheduleRow>, aliases: &AliasTable, zone: Tz, log: &dyn RunLog) -> Self {
        let mut entries: Vec<ScheduleEntry> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut unresolved: HashSet<String> = HashSet::new();

        for row in rows {
            let occurrences = row_occurrences(&row, zone, log);
            if occurrences.is_empty() {
                continue;
            }
            let account_raw = row.account_id.trim().to_string();
            if !account_raw.is_empty()
                && aliases.resolve(&account_raw).is_none()
                && !aliases.is_retired(&account_raw)
                && unresolved.insert(account_raw.clone())
            {
                log.emit(
                    Level::Warning,
                    &format!(
                        "account id {:?} of class {} is neither an alias nor a canonical code",
                        account_raw, row.class_id
                    ),
                );
            }
            for (start, end) in occurrences {
                let entry = ScheduleEntry {
                    start,
                    end,
                    class_name: row.class_name.trim().to_string(),
                    class_id: row.class_id.trim().to_string(),
                    teacher_name: row.teacher_name.trim().to_string(),
                    account_raw: account_raw.clone(),
                    reported: reported_flag(&row.reported),
                    title: non_empty(&row.title),
                    description: non_empty(&row.description),
                    playlist: non_empty(&row.playlist),
                    video: non_empty(&row.video),
                    recording_url: non_empty(&row.recording_url),
                };
                let key = format!("{}|{}", entry.class_id, entry.start.date_naive());
                match slots.get(&key) {
                    Some(&slot) => entries[slot] = entry,
                    None => {
                        slots.insert(key, entries.len());
                        entries.push(entry);
                    }
                }
            }
        }
        Self { entries, zone }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: EntryId) -> &ScheduleEntry {
        &self.entries[id.0]
    }

    pub fn entry_mut(&mut self, id: EntryId) -> &mut ScheduleEntry {
        &mut self.entries[id.0]
    }

    /// Entries in load order, paired with their handles.
    pub fn iter_ids(&self) -> impl Iterator<Item = (EntryId, &ScheduleEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(slot, entry)| (EntryId(slot), entry))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.iter()
    }

    /// The sessions as source rows. Recurring rows come back as one row
    /// per occurrence, dates as `YYYY-MM-DD`, times as local wall clock.
    pub fn to_rows(&self) -> Vec<ScheduleRow> {
        self.entries
            .iter()
            .map(|entry| ScheduleRow {
                class_date: entry.start.date_naive().to_string(),
                start_time: entry.start.format("%H:%M:%S").to_string(),
                end_time: entry.end.format("%H:%M:%S").to_string(),
                class_name: entry.class_name.clone(),
                class_id: entry.class_id.clone(),
                teacher_name: entry.teacher_name.clone(),
                account_id: entry.account_raw.clone(),
                class_time: String::new(),
                reported: if entry.reported { "Yes".to_string() } else { String::new() },
                title: entry.title.clone().unwrap_or_default(),
                description: entry.description.clone().unwrap_or_default(),
                playlist_url: String::new(),
                playlist: entry.playlist.clone().unwrap_or_default(),
                video: entry.video.clone().unwrap_or_default(),
                recording_url: entry.recording_url.clone().unwrap_or_default(),
            })
            .collect()
    }

    pub fn from_json_reader<R: Read>(
        reader: R,
        aliases: &AliasTable,
        zone: Tz,
        log: &dyn RunLog,
    ) -> anyhow::Result<Self> {
        let rows: Vec<ScheduleRow> = serde_json::from_reader(reader)?;
        Ok(Self::load(rows, aliases, zone, log))
    }

    pub fn to_json_writer<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(writer, &self.to_rows())?;
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// The sheet marks reported sessions with whatever the operator typed.
fn reported_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "x"
    )
}

/// The session instants a row describes: one pair for a dated row, one
/// per week for a range row. Empty, with a warning, when the row does
/// not parse or its times are inverted.
fn row_occurrences(row: &ScheduleRow, zone: Tz, log: &dyn RunLog) -> Vec<(DateTime<Tz>, DateTime<Tz>)> {
    let date_field = row.class_date.trim();
    if date_field.contains('/') {
        let (first, last) = match parse_date_range(date_field) {
            Ok(range) => range,
            Err(err) => {
                warn_row(log, row, &err.to_string());
                return Vec::new();
            }
        };
        let window = match row.class_time.parse::<WeekWindow>() {
            Ok(window) => window,
            Err(err) => {
                warn_row(log, row, &err.to_string());
                return Vec::new();
            }
        };
        return recurrence::expand(first, last, &window, zone);
    }

    let date = match NaiveDate::parse_from_str(date_field, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            warn_row(log, row, &format!("unrecognized class date {:?}", date_field));
            return Vec::new();
        }
    };
    let start = match parse_time(&row.start_time) {
        Ok(time) => time,
        Err(err) => {
            warn_row(log, row, &err.to_string());
            return Vec::new();
        }
    };
    let end = match parse_time(&row.end_time) {
        Ok(time) => time,
        Err(err) => {
            warn_row(log, row, &err.to_string());
            return Vec::new();
        }
    };
    if start >= end {
        warn_row(
            log,
            row,
            &format!("start {} is not before end {}", start, end),
        );
        return Vec::new();
    }
    vec![(zoned(date, start, zone), zoned(date, end, zone))]
}

fn warn_row(log: &dyn RunLog, row: &ScheduleRow, reason: &str) {
    log.emit(
        Level::Warning,
        &format!(
            "skipping schedule row for class {} on {:?}: {}",
            row.class_id, row.class_date, reason
        ),
    );
}
