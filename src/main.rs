use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chrono_tz::Tz;
use clap::Parser;

use recmatch::accounts::AliasTable;
use recmatch::log::{FileLog, RunLog, StderrLog};
use recmatch::rename::{self, RenameOptions};
use recmatch::schedule::{ScheduleIndex, ScheduleRow};

#[derive(Parser)]
#[command(name = "recmatch", version, about = "Match downloaded class recordings to the schedule and rename them for upload")]
struct Cli {
    /// Download directory named after the account, e.g. Z09-1223
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Schedule document (JSON array of rows)
    #[arg(short, long)]
    schedule: PathBuf,

    /// Alias table (JSON object of label: code); built-in when omitted
    #[arg(long)]
    aliases: Option<PathBuf>,

    /// IANA time zone the schedule is written in
    #[arg(long, default_value = "America/New_York")]
    zone: String,

    /// Minutes allowed between capture time and scheduled start
    #[arg(long, default_value_t = 15)]
    tolerance: i64,

    /// Show intended renames without touching files
    #[arg(long)]
    dry_run: bool,

    /// Accept a repaired account prefix without asking
    #[arg(long)]
    yes: bool,

    /// Append run messages to this file as well
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let zone: Tz = cli
        .zone
        .parse()
        .map_err(|_| anyhow!("unknown time zone {:?}", cli.zone))?;
    let aliases = match &cli.aliases {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
            AliasTable::from_json_reader(BufReader::new(file))?
        }
        None => AliasTable::builtin(),
    };
    let log: Box<dyn RunLog> = match &cli.log_file {
        Some(path) => Box::new(FileLog::open(path, true)?),
        None => Box::new(StderrLog),
    };

    let file =
        File::open(&cli.schedule).with_context(|| format!("opening {:?}", cli.schedule))?;
    let rows: Vec<ScheduleRow> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("reading {:?}", cli.schedule))?;
    let index = ScheduleIndex::load(rows, &aliases, zone, log.as_ref());
    eprintln!(
        "Loaded {} sessions from {}",
        index.len(),
        cli.schedule.display()
    );

    let working_dir = cli
        .dir
        .canonicalize()
        .with_context(|| format!("resolving {:?}", cli.dir))?;
    let options = RenameOptions {
        working_dir,
        tolerance_minutes: cli.tolerance,
        dry_run: cli.dry_run,
    };

    let assume_yes = cli.yes;
    let mut confirm = move |suggested: &str| -> bool {
        if assume_yes {
            return true;
        }
        eprint!(
            "The directory name is not a valid account id, but looks like {}. Type Y to continue: ",
            suggested
        );
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "Y" | "y")
    };

    let summary = rename::run(&index, &aliases, &options, &mut confirm, log.as_ref())?;

    eprintln!("Completed!");
    eprintln!("{}/{} matched", summary.matched, summary.total);
    if summary.skipped > 0 {
        eprintln!("{} skipped (target name already taken)", summary.skipped);
    }
    Ok(())
}
