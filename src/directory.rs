//! Run the reformatter over files and directories. Each input `name.part.xyz` is written to
//! `name.part_reformat.xyz`, next to the input or in a separate output directory.

use std::{
    fs,
    fs::File,
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use log::{debug, error, info, warn};
use rayon::prelude::*;

use crate::{
    layout::HeaderLayout,
    reformat::{ReformatSummary, reformat},
};

pub const OUTPUT_SUFFIX: &str = "_reformat";

/// Output file name for an input name. `pre.mid.ext` becomes `pre.mid_reformat.ext`; a name
/// with one extension gets the suffix before it, and a name without one gets it appended.
pub fn output_name(name: &str) -> String {
    let parts: Vec<&str> = name.split('.').collect();

    if parts.len() >= 3 {
        let pre = parts[..parts.len() - 2].join(".");
        let mid = parts[parts.len() - 2];
        let ext = parts[parts.len() - 1];
        format!("{pre}.{mid}{OUTPUT_SUFFIX}.{ext}")
    } else if parts.len() == 2 && !parts[0].is_empty() {
        format!("{}{OUTPUT_SUFFIX}.{}", parts[0], parts[1])
    } else {
        // No extension, or a dotfile like `.data`.
        format!("{name}{OUTPUT_SUFFIX}")
    }
}

/// If this name looks like something `output_name` produced.
pub fn is_output_name(name: &str) -> bool {
    let stem = match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    };
    stem.ends_with(OUTPUT_SUFFIX)
}

/// Where the output for `input` goes: beside it, or in `out_dir` under the same name.
pub fn output_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let out_name = output_name(&name);

    match out_dir {
        Some(dir) => dir.join(out_name),
        None => input.with_file_name(out_name),
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    output.with_file_name(name)
}

#[derive(Clone, Debug)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub summary: ReformatSummary,
}

fn write_partial(
    input: &Path,
    partial: &Path,
    layout: &HeaderLayout,
) -> io::Result<ReformatSummary> {
    let reader = BufReader::new(File::open(input)?);
    let writer = BufWriter::new(File::create(partial)?);

    reformat(reader, writer, layout, &input.display().to_string())
}

/// Reformat one file. Output is written to a `.partial` file first, and renamed into place once
/// the whole input has been read; on failure the partial file is removed.
pub fn process_file(
    input: &Path,
    out_dir: Option<&Path>,
    layout: &HeaderLayout,
) -> io::Result<FileReport> {
    info!("Processing file: {}", input.display());

    let output = output_path(input, out_dir);
    let partial = partial_path(&output);

    let summary = match write_partial(input, &partial, layout) {
        Ok(s) => s,
        Err(e) => {
            error!("Fatal error while processing {}: {e}", input.display());
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
    };

    fs::rename(&partial, &output).inspect_err(|e| {
        error!(
            "Unable to move {} to {}: {e}",
            partial.display(),
            output.display()
        );
        let _ = fs::remove_file(&partial);
    })?;

    info!(
        "Finished file {}: wrote {} blocks to {}",
        input.display(),
        summary.blocks_written,
        output.display()
    );

    Ok(FileReport {
        input: input.to_owned(),
        output,
        summary,
    })
}

#[derive(Clone, Debug, Default)]
pub struct DirectoryOptions {
    /// A file is processed if its name ends with, or contains, any of these. Empty means all.
    pub patterns: Vec<String>,
    /// Write outputs here instead of beside the inputs. Created if missing.
    pub out_dir: Option<PathBuf>,
    /// Process files concurrently.
    pub parallel: bool,
}

#[derive(Debug)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub result: io::Result<FileReport>,
}

fn matches_patterns(name: &str, patterns: &[String]) -> bool {
    patterns.is_empty()
        || patterns
            .iter()
            .any(|p| name.ends_with(p.as_str()) || name.contains(p.as_str()))
}

/// The files in `dir` a directory pass would process, sorted by name.
pub fn collect_inputs(dir: &Path, patterns: &[String]) -> io::Result<Vec<PathBuf>> {
    let own_name = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_owned()));

    let mut result = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let Some(name_os) = path.file_name() else {
            continue;
        };
        if own_name.as_deref() == Some(name_os) {
            continue;
        }

        let name = name_os.to_string_lossy();
        if is_output_name(&name) || name.ends_with(".partial") {
            info!("Skipping {}: looks like a reformat output", path.display());
            continue;
        }
        if !matches_patterns(&name, patterns) {
            debug!("Skipping {}: no pattern matches", path.display());
            continue;
        }

        result.push(path);
    }

    result.sort();
    Ok(result)
}

/// Reformat every matching file in `dir`. A failure on one file is logged and recorded in its
/// outcome; the rest still run. Outcomes are in input name order.
pub fn process_directory(
    dir: &Path,
    options: &DirectoryOptions,
    layout: &HeaderLayout,
) -> io::Result<Vec<FileOutcome>> {
    layout.validate()?;

    let inputs = collect_inputs(dir, &options.patterns)?;
    if inputs.is_empty() {
        warn!("No files to process in {}", dir.display());
    }

    if let Some(out_dir) = &options.out_dir {
        fs::create_dir_all(out_dir)?;
    }
    let out_dir = options.out_dir.as_deref();

    let run = |input: &PathBuf| FileOutcome {
        input: input.clone(),
        result: process_file(input, out_dir, layout),
    };

    let result: Vec<FileOutcome> = if options.parallel {
        inputs.par_iter().map(run).collect()
    } else {
        inputs.iter().map(run).collect()
    };

    Ok(result)
}
