//! Assembles and saves the merged workbook plus its companions:
//!
//! - `<stem>_AnonymizationMap.xlsx`: one tab per category listing original
//!   values and their pseudonyms, written when anonymization allocated anything.
//! - `<stem>_FailedValidation.xlsx`: one tab per extended-validation failure
//!   reason, written when extended validation rejected rows.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;

use crate::{
    anonymize::{AnonymizationScope, Anonymizer},
    config::MergeConfig,
    data::CellValue,
    error::MergeError,
    extended::FailureReason,
    io_utils,
    merge::{ExtendedOutcome, MergeOutcome, SheetTable},
    validate::ValidationIssue,
    workbook::{OutputWorkbook, SpreadsheetAccess},
};

pub const ANONYMIZATION_MAP_SUFFIX: &str = "_AnonymizationMap";
pub const FAILED_VALIDATION_SUFFIX: &str = "_FailedValidation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFiles {
    pub merged: PathBuf,
    pub anonymization_map: Option<PathBuf>,
    pub failures: Option<PathBuf>,
}

/// `out/merged.xlsx` + `_AnonymizationMap` → `out/merged_AnonymizationMap.xlsx`.
pub fn companion_path(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "merged".to_string());
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "xlsx".to_string());
    output.with_file_name(format!("{stem}{suffix}.{extension}"))
}

/// One tab per sheet that ended up with columns, in configuration order.
pub fn merged_workbook(tables: &[SheetTable]) -> OutputWorkbook {
    let mut workbook = OutputWorkbook::default();
    for table in tables.iter().filter(|t| !t.columns.is_empty()) {
        let sheet = workbook.add_sheet(&table.name, table.columns.columns.clone());
        sheet.rows = table.rows.clone();
    }
    workbook
}

pub fn anonymization_workbook(anonymizer: &Anonymizer, source_file_column: &str) -> OutputWorkbook {
    let per_file = anonymizer.scope() == AnonymizationScope::File;
    let mut workbook = OutputWorkbook::default();
    for (category, entries) in anonymizer.mappings() {
        if entries.is_empty() {
            continue;
        }
        let mut header = Vec::with_capacity(3);
        if per_file {
            header.push(source_file_column.to_string());
        }
        header.push("Original Value".to_string());
        header.push("Anonymized Value".to_string());

        let sheet = workbook.add_sheet(&category.name, header);
        for entry in entries {
            let mut row = Vec::with_capacity(3);
            if per_file {
                row.push(CellValue::from(entry.file_name.as_deref().unwrap_or_default()));
            }
            row.push(CellValue::text(entry.original.as_str()));
            row.push(CellValue::text(entry.pseudonym.as_str()));
            sheet.push_row(row);
        }
    }
    workbook
}

pub fn failures_workbook(extended: &ExtendedOutcome, source_file_column: &str) -> OutputWorkbook {
    let mut grouped: BTreeMap<FailureReason, Vec<_>> = BTreeMap::new();
    for failure in &extended.failures {
        grouped.entry(failure.reason).or_default().push(failure);
    }

    let prepend_source = !extended.columns.iter().any(|c| c == source_file_column);
    let mut header = Vec::with_capacity(extended.columns.len() + 2);
    if prepend_source {
        header.push(source_file_column.to_string());
    }
    header.push("Failure Reason".to_string());
    header.extend(extended.columns.iter().cloned());

    let mut workbook = OutputWorkbook::default();
    for (reason, failures) in grouped {
        let sheet = workbook.add_sheet(reason.label(), header.clone());
        for failure in failures {
            let mut row = Vec::with_capacity(failure.row.len() + 2);
            if prepend_source {
                row.push(CellValue::text(failure.file_name.as_str()));
            }
            row.push(CellValue::text(reason.label()));
            row.extend(failure.row.iter().cloned());
            sheet.push_row(row);
        }
    }
    workbook
}

/// Saves the merged workbook and any companion workbooks next to it.
pub fn emit(
    access: &dyn SpreadsheetAccess,
    config: &MergeConfig,
    outcome: &MergeOutcome,
    output: &Path,
) -> Result<EmittedFiles, MergeError> {
    let merged = merged_workbook(&outcome.tables);
    access
        .save_workbook(&merged, output)
        .map_err(|err| MergeError::write(output, err))?;
    info!("✓ Wrote merged workbook {:?}", output);

    let mut emitted = EmittedFiles {
        merged: output.to_path_buf(),
        anonymization_map: None,
        failures: None,
    };

    if let Some(anonymizer) = &outcome.anonymizer {
        let map = anonymization_workbook(anonymizer, &config.source_file_column);
        if !map.is_empty() {
            let path = companion_path(output, ANONYMIZATION_MAP_SUFFIX);
            access
                .save_workbook(&map, &path)
                .map_err(|err| MergeError::write(&path, err))?;
            info!("✓ Wrote anonymization map {:?}", path);
            emitted.anonymization_map = Some(path);
        }
    }

    if let Some(extended) = &outcome.extended
        && !extended.failures.is_empty()
    {
        let path = companion_path(output, FAILED_VALIDATION_SUFFIX);
        let failures = failures_workbook(extended, &config.source_file_column);
        access
            .save_workbook(&failures, &path)
            .map_err(|err| MergeError::write(&path, err))?;
        info!(
            "✓ Wrote {} failed row(s) to {:?}",
            extended.failures.len(),
            path
        );
        emitted.failures = Some(path);
    }

    Ok(emitted)
}

/// Writes the issue list as `File,Skipped,Message` CSV; `-` targets stdout.
pub fn write_issues_csv(path: &Path, issues: &[ValidationIssue]) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(path)?;
    writer.write_record(["File", "Skipped", "Message"])?;
    for issue in issues {
        writer.write_record([
            issue.file_name.as_str(),
            if issue.skipped { "true" } else { "false" },
            issue.message.as_str(),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing issues to {path:?}"))
}

/// Writes a serializable report as pretty JSON; `-` targets stdout.
pub fn write_json_report<T: serde::Serialize>(path: &Path, report: &T) -> Result<()> {
    let mut writer = io_utils::open_writer(path)?;
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("Serializing report to {path:?}"))?;
    writeln!(writer)?;
    writer
        .flush()
        .with_context(|| format!("Flushing report to {path:?}"))
}
