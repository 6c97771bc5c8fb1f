use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{anyhow, bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;

use crate::accounts::{self, AliasTable};
use crate::log::{Level, RunLog};
use crate::matcher;
use crate::schedule::ScheduleIndex;

/// Capture stamp at the front of downloaded recording names, e.g.
/// `GMT20220812-183013_Recording_1760x820.mp4`.
static FILE_STAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^GMT\d{8}-\d{6}").unwrap());

/// Characters the upload side chokes on, replaced by `_`.
const HOSTILE: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|', ' '];

pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| if HOSTILE.contains(&c) { '_' } else { c })
        .collect()
}

/// Account prefix encoded in a download directory name like `Z09-1223`.
pub fn account_prefix_of_dir(dir: &Path) -> Option<String> {
    let name = dir.file_name()?.to_str()?;
    let prefix = name.split('-').next()?;
    if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_string())
    }
}

/// Options for one rename pass over a download directory.
#[derive(Debug, Clone)]
pub struct RenameOptions {
    pub working_dir: PathBuf,
    pub tolerance_minutes: i64,
    /// Log intended renames without touching files.
    pub dry_run: bool,
}

/// Counts from one rename pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameSummary {
    pub total: u64,
    pub matched: u64,
    pub renamed: u64,
    pub skipped: u64,
}

/// Renames every `GMT…` recording in the directory. Matched files get
/// `<account>-<stem>___<local start>___<class>___<teacher>`, unmatched
/// ones just gain the account prefix so a later pass can tell them
/// apart. The directory name supplies the account; a repairable typo in
/// it goes through `confirm` before anything is touched.
pub fn run(
    index: &ScheduleIndex,
    aliases: &AliasTable,
    options: &RenameOptions,
    confirm: &mut dyn FnMut(&str) -> bool,
    log: &dyn RunLog,
) -> anyhow::Result<RenameSummary> {
    let dir = options.working_dir.as_path();
    let raw_prefix = account_prefix_of_dir(dir)
        .ok_or_else(|| anyhow!("working directory {:?} has no account prefix", dir))?;
    let prefix = if aliases.is_canonical(&raw_prefix) {
        raw_prefix
    } else {
        let repaired = accounts::repair_format(&raw_prefix);
        if !aliases.is_canonical(&repaired) {
            bail!("directory name {:?} does not name a known account", dir);
        }
        if !confirm(&repaired) {
            bail!(
                "stopped: {:?} was not confirmed as account {}",
                raw_prefix,
                repaired
            );
        }
        repaired
    };

    let mut names: Vec<String> = Vec::new();
    for dirent in fs::read_dir(dir).with_context(|| format!("reading {:?}", dir))? {
        let dirent = dirent?;
        if !dirent.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = dirent.file_name().to_str() {
            if name.starts_with("GMT") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    let mut summary = RenameSummary::default();
    let pb = ProgressBar::new(names.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} Renaming recordings...")
            .unwrap()
            .progress_chars("=> "),
    );

    for name in names {
        summary.total += 1;
        let new_name = plan_name(
            index,
            aliases,
            &prefix,
            &name,
            options.tolerance_minutes,
            &mut summary,
            log,
        );
        if new_name != name {
            let target = dir.join(&new_name);
            if target.exists() {
                summary.skipped += 1;
                log.emit(
                    Level::Warning,
                    &format!("{} already exists; leaving {}", new_name, name),
                );
            } else if options.dry_run {
                summary.renamed += 1;
                log.emit(Level::Info, &format!("[dry run] {} -> {}", name, new_name));
            } else {
                fs::rename(dir.join(&name), &target)
                    .with_context(|| format!("renaming {:?}", name))?;
                summary.renamed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    log.emit(
        Level::Info,
        &format!("{}/{} matched", summary.matched, summary.total),
    );
    Ok(summary)
}

fn plan_name(
    index: &ScheduleIndex,
    aliases: &AliasTable,
    prefix: &str,
    name: &str,
    tolerance_minutes: i64,
    summary: &mut RenameSummary,
    log: &dyn RunLog,
) -> String {
    let (stem, extensions) = match name.split_once('.') {
        Some((stem, rest)) => (stem, Some(rest)),
        None => (name, None),
    };

    let Some(stamp) = FILE_STAMP.find(name) else {
        log.emit(Level::Warning, &format!("NOT MATCHED: {}", name));
        return format!("{}-{}", prefix, name);
    };
    // The stamp reads like a hosted recording title once the dash turns
    // into a space, so the same parser covers both.
    let synthetic = format!("{} {}", prefix, stamp.as_str().replace('-', " "));
    let candidate = match matcher::parse_recording_title(&synthetic) {
        Ok(candidate) => candidate,
        Err(_) => {
            log.emit(Level::Warning, &format!("NOT MATCHED: {}", name));
            return format!("{}-{}", prefix, name);
        }
    };

    match matcher::find_match(
        index,
        aliases,
        &candidate.account_id,
        candidate.captured_at,
        tolerance_minutes,
        log,
    ) {
        Ok(id) => {
            summary.matched += 1;
            let entry = index.entry(id);
            let base = format!(
                "{}-{}___{}___{}___{}",
                prefix,
                stem,
                entry.start.format("%Y-%m-%d_%H%M%S"),
                entry.class_name,
                entry.teacher_name
            );
            let sanitized = sanitize_component(&base);
            match extensions {
                Some(ext) => format!("{}.{}", sanitized, ext),
                None => sanitized,
            }
        }
        Err(_) => {
            log.emit(Level::Warning, &format!("NOT MATCHED: {}", name));
            format!("{}-{}", prefix, name)
        }
    }
}
