#![forbid(unsafe_code)]

//! `study-supervisor-ctl`: offline maintenance for the feedback log.
//!
//! Reads the same file the server writes, so it is safe to run while the
//! server is stopped. Running `migrate` against a live server is also safe
//! because rewrites are atomic, but a concurrent server append may land in
//! the replaced file and be lost.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use study_supervisor::config::GlobalConfig;
use study_supervisor::persistence::{data_dir, FeedbackStore};
use study_supervisor::Result;

#[derive(Debug, Parser)]
#[command(
    name = "study-supervisor-ctl",
    about = "Maintenance CLI for the study-supervisor feedback log",
    version,
    long_about = None
)]
struct Cli {
    /// Feedback log to operate on. Overrides data directory resolution.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Preferred data directory when `--file` is not given.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Configuration file supplying `data_dir` and `feedback_file`.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every readable record as one JSON object per line.
    List,

    /// Print the number of readable records.
    Count,

    /// Convert an array-format log to line-delimited records.
    Migrate,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Cli) -> Result<()> {
    let store = open_store(args)?;

    match args.command {
        Command::List => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for record in store.read_all() {
                writeln!(out, "{}", serde_json::to_string(&record)?)?;
            }
        }
        Command::Count => println!("{}", store.read_all().len()),
        Command::Migrate => {
            if store.migrate()? {
                println!("migrated {}", store.path().display());
            } else {
                println!("{} is already line-delimited", store.path().display());
            }
        }
    }
    Ok(())
}

fn open_store(args: &Cli) -> Result<FeedbackStore> {
    if let Some(file) = args.file.as_ref() {
        return Ok(FeedbackStore::new(file.clone()));
    }

    let config = match args.config.as_ref() {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let preferred = args.data_dir.as_deref().or(config.data_dir.as_deref());
    let dir = data_dir::resolve(preferred);
    Ok(FeedbackStore::in_dir(&dir, &config.feedback_file))
}
