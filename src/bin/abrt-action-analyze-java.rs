//! Analyzes a Java backtrace for ABRT.
//!
//! Reads `DIR/backtrace` (`-d`), a file (`-f`) or standard input, then writes
//! `duphash`, `uuid` and, for problems in remote code, `not-reportable`.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{debug, info};

use abrt_java_agent::analyzer::{self, Analysis};
use abrt_java_agent::logging;

const BACKTRACE_FILE: &str = "backtrace";
const DUPHASH_FILE: &str = "duphash";
const UUID_FILE: &str = "uuid";
const NOT_REPORTABLE_FILE: &str = "not-reportable";

#[derive(Parser, Debug)]
#[command(name = "abrt-action-analyze-java")]
#[command(about = "Analyzes Java backtrace", long_about = None)]
#[command(version)]
struct Cli {
    /// Problem directory
    #[arg(short = 'd', long = "dumpdir", value_name = "DIR", conflicts_with = "backtrace")]
    dump_dir: Option<PathBuf>,

    /// Path to backtrace
    #[arg(short = 'f', long = "backtrace", value_name = "FILE")]
    backtrace: Option<PathBuf>,

    /// Print results on standard output
    #[arg(short = 'o', long = "stdout")]
    stdout: bool,

    /// Be verbose
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_default(match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    });

    let text = read_backtrace(&cli)?;
    let analysis = analyzer::analyze(&text).context("Could not parse the stack trace")?;
    info!("duphash {}", analysis.duphash);
    debug!("remote class locations: {:?}", analysis.remote_locations);

    if cli.stdout {
        print_results(&analysis);
        return Ok(());
    }
    let output_dir = cli.dump_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    write_results(&output_dir, &analysis)
}

fn read_backtrace(cli: &Cli) -> Result<String> {
    if let Some(dir) = &cli.dump_dir {
        let path = dir.join(BACKTRACE_FILE);
        return fs::read_to_string(&path).with_context(|| format!("Can't read {}", path.display()));
    }
    if let Some(path) = &cli.backtrace {
        return fs::read_to_string(path).with_context(|| format!("Can't read {}", path.display()));
    }
    let mut text = String::new();
    io::stdin().read_to_string(&mut text).context("Can't read standard input")?;
    Ok(text)
}

fn print_results(analysis: &Analysis) {
    println!("{DUPHASH_FILE}: {}", analysis.duphash);
    println!("{UUID_FILE}: {}", analysis.uuid());
    if let Some(message) = analysis.not_reportable() {
        println!("{message}");
    }
}

fn write_results(dir: &Path, analysis: &Analysis) -> Result<()> {
    write_item(dir, DUPHASH_FILE, &analysis.duphash)?;
    write_item(dir, UUID_FILE, analysis.uuid())?;
    if let Some(message) = analysis.not_reportable() {
        write_item(dir, NOT_REPORTABLE_FILE, &message)?;
    }
    Ok(())
}

fn write_item(dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("Can't open file '{}' for writing", path.display()))
}
