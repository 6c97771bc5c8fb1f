use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use recmatch::accounts::AliasTable;

#[derive(Parser)]
#[command(name = "canonical", version, about = "Resolve account labels against the alias table")]
struct Cli {
    /// Labels to resolve; read from stdin when empty
    labels: Vec<String>,

    /// Alias table (JSON object of label: code); built-in when omitted
    #[arg(long)]
    table: Option<PathBuf>,

    /// Write the alias table as JSON to this path and exit
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let table = match &cli.table {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
            AliasTable::from_json_reader(BufReader::new(file))?
        }
        None => AliasTable::builtin(),
    };

    if let Some(path) = &cli.dump {
        let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
        table.to_json_writer(BufWriter::new(file))?;
        eprintln!("Wrote {} aliases to {}", table.len(), path.display());
        return Ok(());
    }

    if cli.labels.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line?;
            report(&table, line.trim());
        }
    } else {
        for label in &cli.labels {
            report(&table, label);
        }
    }
    Ok(())
}

fn report(table: &AliasTable, label: &str) {
    if label.is_empty() {
        return;
    }
    match table.resolve(label) {
        Some(code) => println!("{} -> {}", label, code),
        None if table.is_retired(label) => println!("{} -> retired", label),
        None => println!("{} -> ?", label),
    }
}
