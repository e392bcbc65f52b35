mod options;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use log::{info, LevelFilter};
use options::Options;

/// Parses the program arguments.
fn parse_args() -> Options {
    Options::parse()
}

/// Initializes the program logging
///
/// # Arguments
/// * `filter` - The log level filter, i.e., the minimum log level to be logged.
fn initialize_logging(filter: LevelFilter) {
    env_logger::builder()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{}:{} {} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(filter)
        .init();
}

/// The `SPLIT-<stem>` directory alongside `input`, used when no output
/// directory is given on the command line.
fn default_output_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let dirname = format!("SPLIT-{stem}");

    match input.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.join(dirname),
        None => PathBuf::from(dirname),
    }
}

fn print_usage() {
    println!("Usage: step-splitter-cli <input.stp> [output_dir]");
    println!();
    println!("Splits an ISO-10303-21 STEP assembly or multi-volume part into one");
    println!("file per unique rigid body, plus a multiplicity report.");
    println!();
    println!("If [output_dir] is omitted, files are written to SPLIT-<stem> next");
    println!("to the input file.");
}

/// Runs the program.
fn run_program() -> Result<()> {
    let options = parse_args();
    initialize_logging(LevelFilter::from(options.log_level));

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Git hash: {}", env!("GIT_HASH"));

    info!("Options:");
    options.dump_to_log();
    info!("-------");

    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(&options.input_file));

    info!("Splitting {:?} into {:?}...", options.input_file, output_dir);
    let t = Instant::now();
    let report = step_splitter::split_file(&options.input_file, &output_dir)?;
    info!(
        "Splitting...DONE in {} ms, {} unique bodies",
        t.elapsed().as_millis(),
        report.rows.len()
    );

    Ok(())
}

fn main() {
    if std::env::args().len() <= 1 {
        print_usage();
        std::process::exit(0);
    }

    match run_program() {
        Ok(()) => {
            info!("SUCCESS");
        }
        Err(err) => {
            eprintln!("Error: {err}");
            for cause in err.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }

            std::process::exit(1);
        }
    }
}
