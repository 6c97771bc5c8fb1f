use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use url::Url;

use crate::log::{Level, RunLog};
use crate::schedule::ScheduleRow;

/// Destination playlist per class id and teacher, built from the share
/// URLs the schedule rows carry. A key whose rows point at different
/// playlists is poisoned: lookups return nothing until a human fixes
/// the source.
#[derive(Debug, Clone, Default)]
pub struct PlaylistIndex {
    playlists: BTreeMap<String, String>,
    ambiguous: BTreeSet<String>,
}

impl PlaylistIndex {
    pub fn from_rows(rows: &[ScheduleRow], log: &dyn RunLog) -> Self {
        let mut index = Self::default();
        for row in rows {
            let share_url = row.playlist_url.trim();
            if share_url.is_empty() {
                continue;
            }
            let Some(playlist_id) = playlist_id_from_url(share_url) else {
                log.emit(
                    Level::Warning,
                    &format!(
                        "share URL {:?} of class {} has no list parameter",
                        share_url, row.class_id
                    ),
                );
                continue;
            };
            let key = key_of(&row.class_id, &row.teacher_name);
            match index.playlists.get(&key) {
                Some(existing) if *existing != playlist_id => {
                    log.emit(
                        Level::Warning,
                        &format!(
                            "class {} / {} maps to playlists {} and {}; ignoring the key",
                            row.class_id.trim(),
                            row.teacher_name.trim(),
                            existing,
                            playlist_id
                        ),
                    );
                    index.ambiguous.insert(key);
                }
                Some(_) => {}
                None => {
                    index.playlists.insert(key, playlist_id);
                }
            }
        }
        index
    }

    /// The playlist for a class and teacher, unless the key is unknown
    /// or poisoned by conflicting rows.
    pub fn get(&self, class_id: &str, teacher_name: &str) -> Option<&str> {
        let key = key_of(class_id, teacher_name);
        if self.ambiguous.contains(&key) {
            return None;
        }
        self.playlists.get(&key).map(String::as_str)
    }

    pub fn is_ambiguous(&self, class_id: &str, teacher_name: &str) -> bool {
        self.ambiguous.contains(&key_of(class_id, teacher_name))
    }

    pub fn insert(&mut self, class_id: &str, teacher_name: &str, playlist_id: String) {
        self.playlists.insert(key_of(class_id, teacher_name), playlist_id);
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    pub fn from_json_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        let playlists: BTreeMap<String, String> = serde_json::from_reader(reader)?;
        Ok(Self {
            playlists,
            ambiguous: BTreeSet::new(),
        })
    }

    pub fn to_json_writer<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(writer, &self.playlists)?;
        Ok(())
    }
}

fn key_of(class_id: &str, teacher_name: &str) -> String {
    format!("{}|{}", class_id.trim(), teacher_name.trim())
}

/// The playlist id carried in a share URL's `list` query parameter.
pub fn playlist_id_from_url(share_url: &str) -> Option<String> {
    let parsed = Url::parse(share_url).ok()?;
    let (_, id) = parsed.query_pairs().find(|(name, _)| name == "list")?;
    if id.is_empty() {
        None
    } else {
        Some(id.into_owned())
    }
}
