//! sanDB CLI - offline inspection of segment files

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, TimeZone, Utc};
use clap::{Parser, Subcommand};
use sandb_core::partition::{parse_segment_file_name, WindowKey, SEGMENT_EXTENSION};
use sandb_core::segment::read_segment;
use sandb_core::{Payload, Record, Timestamp};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Inspect and verify sanDB segment files without a running server
#[derive(Parser, Debug)]
#[command(name = "sandb-cli", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every record of one segment file
    Inspect {
        /// Path to a `.san` file
        file: PathBuf,

        /// Print a JSON document instead of one line per record
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Decode every segment below a data directory and report broken ones
    Verify {
        /// Data directory root
        data_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { file, json } => {
            inspect(&file, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { data_dir } => {
            let report = verify(&data_dir)?;
            for problem in &report.problems {
                eprintln!("{}: {}", problem.path.display(), problem.reason);
            }
            println!(
                "{} segments, {} records, {} problems",
                report.segments,
                report.records,
                report.problems.len()
            );
            Ok(if report.problems.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn inspect(file: &Path, json: bool) -> anyhow::Result<()> {
    let data = read_segment(file)?.ok_or_else(|| anyhow!("{} does not exist", file.display()))?;

    if json {
        let records: Vec<Record> = data
            .iter()
            .map(|(ts, bytes)| Record {
                time: *ts,
                data: Payload::from_stored(bytes),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "data": records }))?);
        return Ok(());
    }

    for (ts, bytes) in &data {
        let payload = serde_json::to_string(&Payload::from_stored(bytes))?;
        println!("{}\t{}\t{}", ts, format_time(*ts), payload);
    }
    Ok(())
}

fn format_time(ts: Timestamp) -> String {
    Utc.timestamp_millis_opt(ts)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "-".to_string())
}

#[derive(Debug)]
struct Problem {
    path: PathBuf,
    reason: String,
}

#[derive(Debug, Default)]
struct VerifyReport {
    segments: usize,
    records: usize,
    problems: Vec<Problem>,
}

/// Decode every segment file under `data_dir` and check that each record
/// sits in the window its timestamp maps to
fn verify(data_dir: &Path) -> anyhow::Result<VerifyReport> {
    if !data_dir.is_dir() {
        return Err(anyhow!("{} is not a directory", data_dir.display()));
    }

    let mut files = Vec::new();
    collect_segments(data_dir, &mut files)?;
    files.sort();

    let mut report = VerifyReport::default();
    for path in files {
        let data = match read_segment(&path) {
            Ok(Some(data)) => data,
            // Removed while we were walking
            Ok(None) => continue,
            Err(e) => {
                report.problems.push(Problem {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        report.segments += 1;
        report.records += data.len();

        let Some(expected) = window_of_path(&path) else {
            report.problems.push(Problem {
                path,
                reason: "not under <year>/<day>/".to_string(),
            });
            continue;
        };
        let misplaced = data
            .keys()
            .find(|ts| WindowKey::from_timestamp(**ts).ok() != Some(expected));
        if let Some(ts) = misplaced {
            report.problems.push(Problem {
                path,
                reason: format!("record {} does not belong to window {}", ts, expected),
            });
        }
    }

    Ok(report)
}

fn collect_segments(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_segments(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == SEGMENT_EXTENSION) {
            out.push(path);
        }
    }
    Ok(())
}

/// Window implied by `.../<year>/<day>/<window>.san`
fn window_of_path(path: &Path) -> Option<WindowKey> {
    let window = parse_segment_file_name(path.file_name()?.to_str()?)?;
    let day_dir = path.parent()?;
    let day: u32 = day_dir.file_name()?.to_str()?.parse().ok()?;
    let year: i32 = day_dir.parent()?.file_name()?.to_str()?.parse().ok()?;
    Some(WindowKey { year, day, window })
}
