//! Command line entry point: reformat a directory of block files, or inspect an extended XYZ
//! file.

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::error;

use xyz_reformat::{DirectoryOptions, ExtXyz, HeaderLayout, process_directory};

#[derive(Parser)]
#[command(
    name = "xyz_reformat",
    about = "Rewrite multi-block coordinate files as extended XYZ",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reformat every matching file in a directory
    #[command(visible_alias = "r")]
    Reformat(ReformatArgs),

    /// Summarize the frames of an extended XYZ file
    #[command(visible_alias = "i")]
    Inspect(InspectArgs),
}

#[derive(Args)]
struct ReformatArgs {
    /// Directory holding the input files
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Write outputs here instead of beside the inputs
    #[arg(short, long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Only process files whose names end with, or contain, this. Repeatable
    #[arg(short, long = "pattern", value_name = "PATTERN", action = clap::ArgAction::Append)]
    patterns: Vec<String>,

    /// Header layout (TOML with `indices`, `labels`, optional `marker`). Defaults to NENCI-2021
    #[arg(short, long, value_name = "FILE")]
    layout: Option<PathBuf>,

    /// Process files in parallel
    #[arg(long)]
    parallel: bool,
}

#[derive(Args)]
struct InspectArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

fn run_reformat(args: ReformatArgs) -> Result<bool> {
    let layout = match &args.layout {
        Some(path) => HeaderLayout::load(path)
            .with_context(|| format!("loading header layout {}", path.display()))?,
        None => HeaderLayout::nenci_2021(),
    };

    let options = DirectoryOptions {
        patterns: args.patterns,
        out_dir: args.out_dir,
        parallel: args.parallel,
    };

    let outcomes = process_directory(&args.dir, &options, &layout)
        .with_context(|| format!("reading directory {}", args.dir.display()))?;

    let mut all_ok = true;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => println!(
                "{} -> {}: {}",
                report.input.display(),
                report.output.display(),
                report.summary
            ),
            Err(e) => {
                all_ok = false;
                println!("{}: failed: {e}", outcome.input.display());
            }
        }
    }
    println!("{} files processed", outcomes.len());

    Ok(all_ok)
}

fn run_inspect(args: InspectArgs) -> Result<bool> {
    let xyz = ExtXyz::load(&args.file)
        .with_context(|| format!("loading {}", args.file.display()))?;

    println!("{}: {} frames", args.file.display(), xyz.frames.len());
    for (i, frame) in xyz.frames.iter().enumerate() {
        let keys: Vec<&str> = frame.info.iter().map(|(k, _)| k.as_str()).collect();
        println!("  {i:>5}  {:>4} atoms  {}", frame.atoms.len(), keys.join(" "));
    }

    Ok(true)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Reformat(args) => run_reformat(args),
        Command::Inspect(args) => run_inspect(args),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
