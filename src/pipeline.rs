use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::accounts::AliasTable;
use crate::host::{HostedVideo, QuotaLedger, VideoHost, COST_LIST, COST_WRITE, DEFAULT_QUOTA_BUDGET};
use crate::log::{Level, RunLog};
use crate::matcher::{self, MatchFailure, RecordingCandidate};
use crate::playlist::PlaylistIndex;
use crate::schedule::{EntryId, ScheduleEntry, ScheduleIndex};

/// Page size when listing playlists.
const PAGE_SIZE: u32 = 50;

/// Units a fresh recording consumes: metadata update, playlist insert,
/// intake removal.
const PUBLISH_COST: u32 = 3 * COST_WRITE;

/// Units one rollback consumes: metadata update, intake insert, error
/// removal.
const ROLLBACK_COST: u32 = 3 * COST_WRITE;

/// Options for one drain of the intake playlist.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// The playlist recordings land in after upload.
    pub intake_playlist: String,
    pub tolerance_minutes: i64,
    /// Upper bound on recordings handled in one run.
    pub process_limit: usize,
    /// Log intended changes without calling any mutating endpoint.
    pub dry_run: bool,
    pub quota_budget: u32,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            intake_playlist: String::new(),
            tolerance_minutes: 15,
            process_limit: 50,
            dry_run: false,
            quota_budget: DEFAULT_QUOTA_BUDGET,
        }
    }
}

/// Outcome counts of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub scanned: u64,
    pub published: u64,
    /// Recordings the schedule already knew, put back in their place.
    pub reconciled: u64,
    pub malformed: u64,
    pub unresolved: u64,
    pub unmatched: u64,
    pub no_destination: u64,
    pub conflicting: u64,
    pub quota_exhausted: bool,
}

/// Outcome counts of one error-playlist rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackSummary {
    pub scanned: u64,
    /// Recordings returned to the intake playlist.
    pub rolled_back: u64,
    pub quota_exhausted: bool,
}

/// Drains the intake playlist: every recording that matches a session
/// gets its title and description rewritten, moves to the session's
/// playlist, and stamps the session. Recordings that cannot be handled
/// stay in the intake playlist for the next run.
pub fn process_intake(
    host: &mut dyn VideoHost,
    index: &mut ScheduleIndex,
    playlists: &PlaylistIndex,
    aliases: &AliasTable,
    options: &ProcessOptions,
    processed_log: Option<&Path>,
    log: &dyn RunLog,
) -> anyhow::Result<ProcessSummary> {
    let mut ledger = QuotaLedger::new(options.quota_budget);
    let mut summary = ProcessSummary::default();

    let pending = collect_pending(
        host,
        &options.intake_playlist,
        options.process_limit,
        &mut ledger,
        &mut summary.quota_exhausted,
    )?;

    for video in &pending {
        if !ledger.can_afford(PUBLISH_COST + COST_LIST) {
            summary.quota_exhausted = true;
            log.emit(
                Level::Warning,
                &format!(
                    "quota budget exhausted after {} units; {:?} waits for the next run",
                    ledger.spent(),
                    video.title
                ),
            );
            break;
        }
        summary.scanned += 1;
        process_one(
            host,
            index,
            playlists,
            aliases,
            options,
            processed_log,
            &mut ledger,
            &mut summary,
            video,
            log,
        )?;
    }

    log.emit(
        Level::Info,
        &format!(
            "{} recordings scanned, {} published, {} reconciled, {} units spent",
            summary.scanned, summary.published, summary.reconciled, ledger.spent()
        ),
    );
    Ok(summary)
}

fn collect_pending(
    host: &mut dyn VideoHost,
    playlist_id: &str,
    limit: usize,
    ledger: &mut QuotaLedger,
    quota_exhausted: &mut bool,
) -> anyhow::Result<Vec<HostedVideo>> {
    let mut pending = Vec::new();
    let mut page_token: Option<String> = None;
    while pending.len() < limit {
        if !ledger.try_charge(COST_LIST) {
            *quota_exhausted = true;
            break;
        }
        let page = host.playlist_page(playlist_id, page_token.as_deref(), PAGE_SIZE)?;
        pending.extend(page.items);
        match page.next_page {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
    pending.truncate(limit);
    Ok(pending)
}

#[allow(clippy::too_many_arguments)]
fn process_one(
    host: &mut dyn VideoHost,
    index: &mut ScheduleIndex,
    playlists: &PlaylistIndex,
    aliases: &AliasTable,
    options: &ProcessOptions,
    processed_log: Option<&Path>,
    ledger: &mut QuotaLedger,
    summary: &mut ProcessSummary,
    video: &HostedVideo,
    log: &dyn RunLog,
) -> anyhow::Result<()> {
    let candidate = match matcher::parse_recording_title(&video.title) {
        Ok(candidate) => candidate,
        Err(_) => match recover_candidate(video) {
            Some(candidate) => candidate,
            None => {
                summary.malformed += 1;
                log.emit(
                    Level::Warning,
                    &format!(
                        "cannot read an account and capture time from {:?}",
                        video.title
                    ),
                );
                return Ok(());
            }
        },
    };

    let id = match matcher::find_match(
        index,
        aliases,
        &candidate.account_id,
        candidate.captured_at,
        options.tolerance_minutes,
        log,
    ) {
        Ok(id) => id,
        Err(MatchFailure::UnresolvedIdentifier(_)) => {
            summary.unresolved += 1;
            return Ok(());
        }
        Err(MatchFailure::NoMatch) | Err(MatchFailure::MalformedTitle(_)) => {
            summary.unmatched += 1;
            log.emit(Level::Warning, &format!("no session for {:?}", video.title));
            return Ok(());
        }
    };

    let entry = index.entry(id);
    let destination = entry.playlist.clone().or_else(|| {
        playlists
            .get(&entry.class_id, &entry.teacher_name)
            .map(str::to_string)
    });
    let Some(destination) = destination else {
        summary.no_destination += 1;
        log.emit(
            Level::Warning,
            &format!(
                "no destination playlist for class {} / {}",
                entry.class_id, entry.teacher_name
            ),
        );
        return Ok(());
    };

    match entry.video.clone() {
        None => publish(
            host,
            index,
            id,
            aliases,
            &destination,
            video,
            options,
            processed_log,
            ledger,
            summary,
            log,
        ),
        Some(existing) if existing == video.video_id => {
            reconcile(host, &destination, video, options, ledger, summary, log)
        }
        Some(existing) => {
            summary.conflicting += 1;
            log.emit(
                Level::Warning,
                &format!(
                    "session {} on {} already has video {}; leaving {} in the intake playlist",
                    entry.class_id,
                    entry.start.date_naive(),
                    existing,
                    video.video_id
                ),
            );
            Ok(())
        }
    }
}

/// A published description keeps the intake title as its last line, so
/// a video that bounced back can still be identified.
fn recover_candidate(video: &HostedVideo) -> Option<RecordingCandidate> {
    let last = video.description.lines().last()?;
    matcher::parse_recording_title(last).ok()
}

#[allow(clippy::too_many_arguments)]
fn publish(
    host: &mut dyn VideoHost,
    index: &mut ScheduleIndex,
    id: EntryId,
    aliases: &AliasTable,
    destination: &str,
    video: &HostedVideo,
    options: &ProcessOptions,
    processed_log: Option<&Path>,
    ledger: &mut QuotaLedger,
    summary: &mut ProcessSummary,
    log: &dyn RunLog,
) -> anyhow::Result<()> {
    let title = publish_title(index.entry(id), &video.title);
    let description = publish_description(index.entry(id), aliases, &video.title);

    if options.dry_run {
        summary.published += 1;
        log.emit(
            Level::Info,
            &format!(
                "[dry run] would publish {} as {:?} into {}",
                video.video_id, title, destination
            ),
        );
        return Ok(());
    }

    if !ledger.try_charge(PUBLISH_COST) {
        summary.quota_exhausted = true;
        return Ok(());
    }
    host.update_video(&video.video_id, &title, &description)?;
    host.add_to_playlist(destination, &video.video_id)?;
    host.remove_playlist_item(&video.item_id)?;

    let entry = index.entry_mut(id);
    entry.video = Some(video.video_id.clone());
    entry.playlist = Some(destination.to_string());
    entry.title = Some(title.clone());
    entry.description = Some(description);
    if let Some(path) = processed_log {
        append_processed(path, index.entry(id), &video.video_id)?;
    }

    summary.published += 1;
    log.emit(
        Level::Info,
        &format!("published {} as {:?} into {}", video.video_id, title, destination),
    );
    Ok(())
}

/// The recording is already stamped on the session. Make sure it sits
/// in its playlist, then drop it from intake.
fn reconcile(
    host: &mut dyn VideoHost,
    destination: &str,
    video: &HostedVideo,
    options: &ProcessOptions,
    ledger: &mut QuotaLedger,
    summary: &mut ProcessSummary,
    log: &dyn RunLog,
) -> anyhow::Result<()> {
    if options.dry_run {
        summary.reconciled += 1;
        log.emit(
            Level::Info,
            &format!(
                "[dry run] would reconcile {} into {}",
                video.video_id, destination
            ),
        );
        return Ok(());
    }

    let mut placed = false;
    let mut page_token: Option<String> = None;
    loop {
        if !ledger.try_charge(COST_LIST) {
            summary.quota_exhausted = true;
            return Ok(());
        }
        let page = host.playlist_page(destination, page_token.as_deref(), PAGE_SIZE)?;
        if page.items.iter().any(|item| item.video_id == video.video_id) {
            placed = true;
            break;
        }
        match page.next_page {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    if !placed {
        if !ledger.try_charge(COST_WRITE) {
            summary.quota_exhausted = true;
            return Ok(());
        }
        host.add_to_playlist(destination, &video.video_id)?;
    }
    if !ledger.try_charge(COST_WRITE) {
        summary.quota_exhausted = true;
        return Ok(());
    }
    host.remove_playlist_item(&video.item_id)?;

    summary.reconciled += 1;
    log.emit(
        Level::Info,
        &format!(
            "{} was already published; removed it from the intake playlist",
            video.video_id
        ),
    );
    Ok(())
}

/// `<class name> | <teacher> | <local start>`, keeping a Gallery marker
/// from intake titles that carry one.
fn publish_title(entry: &ScheduleEntry, intake_title: &str) -> String {
    let mut title = format!(
        "{} | {} | {}",
        entry.class_name,
        entry.teacher_name,
        entry.start.format("%Y-%m-%d %H:%M")
    );
    if intake_title.to_ascii_lowercase().contains("gallery") {
        title.push_str(" Gallery");
    }
    title
}

/// Machine-readable line first, the intake title last.
fn publish_description(entry: &ScheduleEntry, aliases: &AliasTable, intake_title: &str) -> String {
    format!(
        "###{}|{}|{}|{}|{}###\n{}",
        entry.canonical_account(aliases),
        entry.class_id,
        entry.start.format("%Y-%m-%d %H:%M:%S"),
        entry.teacher_name,
        entry.class_name,
        intake_title
    )
}

/// One line per published recording, append-only.
fn append_processed(path: &Path, entry: &ScheduleEntry, video_id: &str) -> anyhow::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{},{},{},{},{}",
        entry.class_id,
        entry.start.format("%Y-%m-%d"),
        entry.start.format("%H:%M:%S"),
        entry.teacher_name,
        video_id
    )?;
    Ok(())
}

/// Drains the error playlist back into intake: each recording loses the
/// machine-readable first line of its description, keeps its title, and
/// returns to the intake playlist for another pass once the underlying
/// problem is fixed.
pub fn rollback_errors(
    host: &mut dyn VideoHost,
    error_playlist: &str,
    options: &ProcessOptions,
    log: &dyn RunLog,
) -> anyhow::Result<RollbackSummary> {
    let mut ledger = QuotaLedger::new(options.quota_budget);
    let mut summary = RollbackSummary::default();

    let pending = collect_pending(
        host,
        error_playlist,
        options.process_limit,
        &mut ledger,
        &mut summary.quota_exhausted,
    )?;

    for video in &pending {
        if !ledger.can_afford(ROLLBACK_COST) {
            summary.quota_exhausted = true;
            log.emit(
                Level::Warning,
                &format!(
                    "quota budget exhausted after {} units; {:?} stays in the error playlist",
                    ledger.spent(),
                    video.title
                ),
            );
            break;
        }
        summary.scanned += 1;

        if options.dry_run {
            summary.rolled_back += 1;
            log.emit(
                Level::Info,
                &format!(
                    "[dry run] would return {} to the intake playlist",
                    video.video_id
                ),
            );
            continue;
        }

        if !ledger.try_charge(ROLLBACK_COST) {
            summary.quota_exhausted = true;
            break;
        }
        let description = strip_first_line(&video.description);
        host.update_video(&video.video_id, &video.title, &description)?;
        host.add_to_playlist(&options.intake_playlist, &video.video_id)?;
        host.remove_playlist_item(&video.item_id)?;

        summary.rolled_back += 1;
        log.emit(
            Level::Info,
            &format!("returned {} to the intake playlist", video.video_id),
        );
    }

    log.emit(
        Level::Info,
        &format!(
            "{} recordings scanned, {} returned to intake, {} units spent",
            summary.scanned,
            summary.rolled_back,
            ledger.spent()
        ),
    );
    Ok(summary)
}

/// A publish writes the machine-readable line first; rolling back drops
/// it. A description without a newline strips to nothing.
fn strip_first_line(description: &str) -> String {
    match description.split_once('\n') {
        Some((_, rest)) => rest.to_string(),
        None => String::new(),
    }
}

/// Creates hosting-side playlists for class/teacher pairs that have
/// none. Pairs with conflicting source rows are left for a human.
pub fn ensure_playlists(
    host: &mut dyn VideoHost,
    index: &ScheduleIndex,
    playlists: &mut PlaylistIndex,
    dry_run: bool,
    log: &dyn RunLog,
) -> anyhow::Result<u64> {
    let mut created = 0u64;
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for entry in index.iter() {
        if !seen.insert((entry.class_id.clone(), entry.teacher_name.clone())) {
            continue;
        }
        if playlists.get(&entry.class_id, &entry.teacher_name).is_some()
            || playlists.is_ambiguous(&entry.class_id, &entry.teacher_name)
        {
            continue;
        }
        let title = format!("{} | {}", entry.class_name, entry.teacher_name);
        let description = format!("###{}:{}###", entry.class_id, entry.class_name);
        if dry_run {
            created += 1;
            log.emit(
                Level::Info,
                &format!("[dry run] would create playlist {:?}", title),
            );
            continue;
        }
        let playlist_id = host.create_playlist(&title, &description)?;
        log.emit(
            Level::Info,
            &format!(
                "created playlist {} for class {} / {}",
                playlist_id, entry.class_id, entry.teacher_name
            ),
        );
        playlists.insert(&entry.class_id, &entry.teacher_name, playlist_id);
        created += 1;
    }
    Ok(created)
}
