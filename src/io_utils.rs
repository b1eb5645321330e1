//! Filesystem helpers: input discovery and text output sinks.
//!
//! - **Input discovery**: `collect_inputs` expands directories into their
//!   `.xlsx` files (sorted by name), drops duplicates, and never returns the
//!   merge's own output file or its companion workbooks.
//! - **Output sinks**: the `-` path convention routes through stdout.
//! - **Quoting**: CSV output uses `QuoteStyle::Always`.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use csv::QuoteStyle;
use itertools::Itertools;
use log::debug;

use crate::output::{ANONYMIZATION_MAP_SUFFIX, FAILED_VALIDATION_SUFFIX, companion_path};

pub const WORKBOOK_EXTENSION: &str = "xlsx";

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

/// True for `.xlsx` files that are not Excel lock files (`~$name.xlsx`).
pub fn is_workbook(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(WORKBOOK_EXTENSION));
    let lock_file = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("~$"));
    has_extension && !lock_file
}

fn normalized(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Resolves command-line inputs into the ordered list of workbooks to merge.
pub fn collect_inputs(inputs: &[PathBuf], output: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found = fs::read_dir(input)
                .with_context(|| format!("Reading input directory {input:?}"))?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<Vec<_>>>()
                .with_context(|| format!("Listing input directory {input:?}"))?
                .into_iter()
                .filter(|path| path.is_file() && is_workbook(path))
                .collect::<Vec<_>>();
            found.sort();
            debug!("Directory {:?} contributed {} workbook(s)", input, found.len());
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }

    let excluded = output
        .map(|output| {
            vec![
                normalized(output),
                normalized(&companion_path(output, ANONYMIZATION_MAP_SUFFIX)),
                normalized(&companion_path(output, FAILED_VALIDATION_SUFFIX)),
            ]
        })
        .unwrap_or_default();
    let files = files
        .into_iter()
        .unique_by(|path| normalized(path))
        .filter(|path| {
            let keep = !excluded.contains(&normalized(path));
            if !keep {
                debug!("Ignoring output file {:?} among inputs", path);
            }
            keep
        })
        .collect();
    Ok(files)
}

pub fn open_writer(path: &Path) -> Result<Box<dyn Write>> {
    if is_dash(path) {
        return Ok(Box::new(std::io::stdout()));
    }
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    Ok(Box::new(BufWriter::new(file)))
}

pub fn open_csv_writer(path: &Path) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer = open_writer(path)?;
    let mut builder = csv::WriterBuilder::new();
    builder.quote_style(QuoteStyle::Always).double_quote(true);
    Ok(builder.from_writer(writer))
}
