use anyhow::anyhow;
use chrono_tz::Tz;
use clap::Parser;

use recmatch::recurrence::{self, WeekWindow};

#[derive(Parser)]
#[command(name = "expand", version, about = "Expand a recurring class's date range into individual sessions")]
struct Cli {
    /// First and last class dates, e.g. 09/16/2022-01/13/2023
    dates: String,

    /// Weekly slot, e.g. "Fri 19:00-20:00"
    window: String,

    /// IANA time zone of the wall-clock times
    #[arg(long, default_value = "America/New_York")]
    zone: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let zone: Tz = cli
        .zone
        .parse()
        .map_err(|_| anyhow!("unknown time zone {:?}", cli.zone))?;
    let (first, last) = recurrence::parse_date_range(&cli.dates)?;
    let window: WeekWindow = cli.window.parse()?;

    let occurrences = recurrence::expand(first, last, &window, zone);
    for (start, end) in &occurrences {
        println!(
            "{}  {}",
            start.format("%Y-%m-%d %H:%M:%S %Z"),
            end.format("%H:%M:%S %Z")
        );
    }
    eprintln!("{} sessions", occurrences.len());
    Ok(())
}
