//! File-level and row-level validation.
//!
//! File-level checks decide whether an input participates in the merge at all;
//! row-level checks flag rows whose mandatory cells are blank. Both feed the
//! same [`ValidationIssue`] list, distinguished by the `skipped` flag.

use serde::Serialize;

use crate::{
    columns::OutputColumnSet,
    config::{MergeConfig, MergeOptions, SheetSchema},
    data::CellValue,
    headers::FileColumnSet,
    workbook::SourceWorkbook,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub file_name: String,
    /// True when the file or row was dropped from the merge.
    pub skipped: bool,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(file_name: &str, skipped: bool, message: impl Into<String>) -> Self {
        Self {
            file_name: file_name.to_string(),
            skipped,
            message: message.into(),
        }
    }
}

/// Problems that make a file unusable; empty when the file is valid.
///
/// `headers` holds the file's resolved headers per configured sheet, as
/// returned by [`crate::headers::resolve_workbook`].
pub fn validate_file(
    config: &MergeConfig,
    options: &MergeOptions,
    workbook: &dyn SourceWorkbook,
    headers: &[Option<FileColumnSet>],
) -> Vec<String> {
    let mut problems = Vec::new();

    if !workbook.sheet_exists(&config.required_sheet) {
        problems.push(format!(
            "Missing required sheet '{}'",
            config.required_sheet
        ));
    } else if let Some(idx) = config
        .sheets
        .iter()
        .position(|schema| config.is_required_sheet(&schema.name))
        && let Some(present) = headers.get(idx).and_then(Option::as_ref)
    {
        let schema = &config.sheets[idx];
        let missing = config
            .checked_mandatory_columns(schema)
            .filter(|column| !present.contains(column))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            problems.push(format!(
                "Sheet '{}' is missing mandatory column(s): {}",
                schema.name,
                missing.join(", ")
            ));
        }
    }

    if !options.ignore_missing_optional_sheets {
        for schema in &config.sheets {
            if config.is_required_sheet(&schema.name) || workbook.sheet_exists(&schema.name) {
                continue;
            }
            problems.push(format!("Missing optional sheet '{}'", schema.name));
        }
    }

    problems
}

/// Precomputed output positions of the mandatory columns that must hold a value.
#[derive(Debug, Clone, Default)]
pub struct RowCheck {
    columns: Vec<(usize, String)>,
}

impl RowCheck {
    pub fn new(config: &MergeConfig, schema: Option<&SheetSchema>, output: &OutputColumnSet) -> Self {
        let columns = schema
            .map(|schema| {
                config
                    .checked_mandatory_columns(schema)
                    .filter_map(|name| output.position(name).map(|idx| (idx, name.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Self { columns }
    }

    /// Names of mandatory columns left blank in `row`.
    pub fn empty_mandatory<'a>(&'a self, row: &[CellValue]) -> Vec<&'a str> {
        self.columns
            .iter()
            .filter(|(idx, _)| row.get(*idx).is_none_or(CellValue::is_blank))
            .map(|(_, name)| name.as_str())
            .collect()
    }
}
