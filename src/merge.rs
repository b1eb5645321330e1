//! Two-pass merge orchestration.
//!
//! A run moves through [`MergeStage`]s in order:
//!
//! - **Validating**: each file is opened once and every configured sheet's
//!   headers are resolved; invalid files are dropped when `skip_invalid_files`
//!   is set, otherwise recorded and kept.
//! - **AnalyzingColumns**: pass 1 aggregates the resolved headers into one
//!   [`OutputColumnSet`] per sheet.
//! - **ExtractingRows**: pass 2 maps each file's rows onto the output columns,
//!   applying the mandatory-value check, anonymization, the source-file column,
//!   and extended validation.
//! - **Writing**: the tables and companion workbooks are handed to
//!   [`crate::output::emit`].
//!
//! Files are processed strictly in input order so pseudonym assignment is
//! reproducible.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::{
    anonymize::{AnonymizationScope, Anonymizer},
    columns::{AggregateOptions, OutputColumnSet, aggregate, map_columns},
    config::{MergeConfig, MergeOptions, SheetSchema},
    data::{CellValue, row_is_blank},
    error::MergeError,
    extended::{ExtendedValidationFailure, ExtendedValidationSummary, ExtendedValidator},
    headers::{FileColumnSet, resolve_workbook},
    output,
    validate::{RowCheck, ValidationIssue, validate_file},
    workbook::{SourceWorkbook, SpreadsheetAccess},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MergeStage {
    Validating,
    AnalyzingColumns,
    ExtractingRows,
    Writing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub name: String,
}

impl InputFile {
    pub fn new(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path: path.to_path_buf(),
            name,
        }
    }
}

/// Merged rows for one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub name: String,
    pub columns: OutputColumnSet,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug)]
pub struct ExtendedOutcome {
    /// Output columns of the primary sheet, describing each failure's row snapshot.
    pub columns: Vec<String>,
    pub failures: Vec<ExtendedValidationFailure>,
    pub summary: ExtendedValidationSummary,
}

/// Everything produced before the Writing stage.
#[derive(Debug)]
pub struct MergeOutcome {
    pub tables: Vec<SheetTable>,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
    pub anonymizer: Option<Anonymizer>,
    pub extended: Option<ExtendedOutcome>,
    pub files_supplied: usize,
    pub files_processed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetSummary {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub files_supplied: usize,
    pub files_processed: usize,
    pub sheets: Vec<SheetSummary>,
    pub anonymized: BTreeMap<String, usize>,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
    pub extended_validation: Option<ExtendedValidationSummary>,
    pub output: PathBuf,
    pub anonymization_map: Option<PathBuf>,
    pub failed_validation: Option<PathBuf>,
}

impl MergeReport {
    pub fn sheet(&self, name: &str) -> Option<&SheetSummary> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// A kept input; its workbook stays open until extraction finishes.
struct OpenInput {
    file: InputFile,
    workbook: Box<dyn SourceWorkbook>,
    /// Resolved headers per configured sheet, consumed by the column analysis.
    headers: Vec<Option<FileColumnSet>>,
}

struct SheetPlan<'c> {
    schema: &'c SheetSchema,
    output: OutputColumnSet,
    /// Indices into the working file list of files that contain this sheet.
    contributors: Vec<(usize, FileColumnSet)>,
}

pub struct Merger<'a> {
    access: &'a dyn SpreadsheetAccess,
    config: &'a MergeConfig,
    options: &'a MergeOptions,
    stage: MergeStage,
}

impl<'a> Merger<'a> {
    pub fn new(
        access: &'a dyn SpreadsheetAccess,
        config: &'a MergeConfig,
        options: &'a MergeOptions,
    ) -> Self {
        Self {
            access,
            config,
            options,
            stage: MergeStage::Validating,
        }
    }

    pub fn stage(&self) -> MergeStage {
        self.stage
    }

    /// Merges `inputs` and writes the result to `output`.
    pub fn run(&mut self, inputs: &[PathBuf], output: &Path) -> Result<MergeReport, MergeError> {
        let outcome = self.merge(inputs)?;

        self.enter(MergeStage::Writing);
        let emitted = match output::emit(self.access, self.config, &outcome, output) {
            Ok(emitted) => emitted,
            Err(err) => return Err(self.fail(err)),
        };
        self.enter(MergeStage::Done);

        let sheets = outcome
            .tables
            .iter()
            .filter(|t| !t.columns.is_empty())
            .map(|t| SheetSummary {
                name: t.name.clone(),
                rows: t.rows.len(),
                columns: t.columns.len(),
            })
            .collect();
        Ok(MergeReport {
            files_supplied: outcome.files_supplied,
            files_processed: outcome.files_processed,
            sheets,
            anonymized: outcome
                .anonymizer
                .as_ref()
                .map(Anonymizer::counts)
                .unwrap_or_default(),
            issues: outcome.issues,
            warnings: outcome.warnings,
            extended_validation: outcome.extended.map(|e| e.summary),
            output: emitted.merged,
            anonymization_map: emitted.anonymization_map,
            failed_validation: emitted.failures,
        })
    }

    /// Runs validation and both passes, returning the in-memory tables.
    pub fn merge(&mut self, inputs: &[PathBuf]) -> Result<MergeOutcome, MergeError> {
        if inputs.is_empty() {
            return Err(self.fail(MergeError::NoInputFiles));
        }
        if let Err(err) = self.config.validate() {
            return Err(self.fail(MergeError::InvalidConfig(err.into())));
        }
        let mut issues = Vec::new();

        self.enter(MergeStage::Validating);
        let mut files = self.validate_inputs(inputs, &mut issues)?;

        self.enter(MergeStage::AnalyzingColumns);
        let plans = self.analyze_columns(&mut files);

        self.enter(MergeStage::ExtractingRows);
        let mut failed = HashSet::new();
        let mut anonymizer = self.options.anonymize.then(|| {
            let scope = if self.options.anonymize_per_file {
                AnonymizationScope::File
            } else {
                AnonymizationScope::Run
            };
            Anonymizer::new(&self.config.anonymization, scope)
        });
        let mut warnings = Vec::new();
        let mut tables = Vec::with_capacity(plans.len());
        let mut extended = None;

        for (plan, missing) in plans {
            if plan.contributors.is_empty() {
                debug!("Sheet '{}' is absent from every input", plan.schema.name);
            } else if !missing.is_empty() {
                let message = format!(
                    "Sheet '{}' is missing mandatory column(s) across inputs: {}",
                    plan.schema.name,
                    missing.join(", ")
                );
                warn!("{message}");
                warnings.push(message);
            }
            let mut validator = (self.options.extended_validation
                && self.config.is_required_sheet(&plan.schema.name))
            .then(|| ExtendedValidator::new(self.config, &plan.output, self.options.max_row_limit));

            let rows = self.extract_sheet(
                &plan,
                &mut files,
                &mut failed,
                anonymizer.as_mut(),
                validator.as_mut(),
                &mut issues,
            )?;
            info!(
                "Sheet '{}': {} row(s) across {} column(s)",
                plan.schema.name,
                rows.len(),
                plan.output.len()
            );
            if let Some(validator) = validator {
                let (failures, summary) = validator.into_parts();
                extended = Some(ExtendedOutcome {
                    columns: plan.output.columns.clone(),
                    failures,
                    summary,
                });
            }
            tables.push(SheetTable {
                name: plan.schema.name.clone(),
                columns: plan.output,
                rows,
            });
        }

        Ok(MergeOutcome {
            tables,
            issues,
            warnings,
            anonymizer,
            extended,
            files_supplied: inputs.len(),
            files_processed: files.len() - failed.len(),
        })
    }

    fn validate_inputs(
        &mut self,
        inputs: &[PathBuf],
        issues: &mut Vec<ValidationIssue>,
    ) -> Result<Vec<OpenInput>, MergeError> {
        info!("Validating {} input file(s)", inputs.len());
        let skip = self.options.skip_invalid_files;
        let mut kept = Vec::with_capacity(inputs.len());
        let mut valid = 0;

        for path in inputs {
            let file = InputFile::new(path);
            let opened = self.access.open_workbook(path).and_then(|mut workbook| {
                let headers = resolve_workbook(self.config, workbook.as_mut())?;
                Ok((workbook, headers))
            });
            let (workbook, headers) = match opened {
                Ok(opened) => opened,
                Err(err) if skip => {
                    warn!("Skipping {:?}: {err:#}", file.name);
                    issues.push(ValidationIssue::new(
                        &file.name,
                        true,
                        format!("Unable to read workbook: {err:#}"),
                    ));
                    continue;
                }
                Err(err) => return Err(self.fail(MergeError::read(path, err))),
            };
            let problems = validate_file(self.config, self.options, &*workbook, &headers);
            let input = OpenInput {
                file,
                workbook,
                headers,
            };

            if problems.is_empty() {
                debug!("{:?} passed validation", input.file.name);
                valid += 1;
                kept.push(input);
                continue;
            }
            let message = problems.join("; ");
            if skip {
                warn!("Skipping invalid file {:?}: {message}", input.file.name);
                issues.push(ValidationIssue::new(&input.file.name, true, message));
            } else {
                warn!("File {:?} failed validation: {message}", input.file.name);
                issues.push(ValidationIssue::new(&input.file.name, false, message));
                kept.push(input);
            }
        }

        if valid == 0 {
            return Err(self.fail(MergeError::NoValidFiles {
                issues: issues.len(),
            }));
        }
        info!("{} of {} file(s) passed validation", valid, inputs.len());
        Ok(kept)
    }

    fn analyze_columns(&self, files: &mut [OpenInput]) -> Vec<(SheetPlan<'a>, Vec<String>)> {
        let config = self.config;
        let mut per_sheet: Vec<Vec<(usize, FileColumnSet)>> = vec![Vec::new(); config.sheets.len()];
        for (file_idx, input) in files.iter_mut().enumerate() {
            for (sheet_idx, set) in std::mem::take(&mut input.headers).into_iter().enumerate() {
                if let Some(set) = set {
                    per_sheet[sheet_idx].push((file_idx, set));
                }
            }
        }

        let source_file_column = self
            .options
            .include_source_file_name
            .then_some(config.source_file_column.as_str());
        let options = AggregateOptions {
            only_mandatory_columns: self.options.only_mandatory_columns,
            source_file_column,
        };
        config
            .sheets
            .iter()
            .zip(per_sheet)
            .map(|(schema, contributors)| {
                let sets = contributors
                    .iter()
                    .map(|(_, set)| set.clone())
                    .collect::<Vec<_>>();
                let aggregation = aggregate(Some(schema), &sets, options);
                debug!(
                    "Sheet '{}': {} contributing file(s), output columns {:?}",
                    schema.name,
                    contributors.len(),
                    aggregation.output.columns
                );
                (
                    SheetPlan {
                        schema,
                        output: aggregation.output,
                        contributors,
                    },
                    aggregation.missing_mandatory,
                )
            })
            .collect()
    }

    fn extract_sheet(
        &mut self,
        plan: &SheetPlan<'_>,
        files: &mut [OpenInput],
        failed: &mut HashSet<usize>,
        mut anonymizer: Option<&mut Anonymizer>,
        mut validator: Option<&mut ExtendedValidator>,
        issues: &mut Vec<ValidationIssue>,
    ) -> Result<Vec<Vec<CellValue>>, MergeError> {
        let mut rows = Vec::new();
        if plan.output.is_empty() {
            return Ok(rows);
        }
        let sheet_name = plan.schema.name.as_str();
        let row_check = RowCheck::new(self.config, Some(plan.schema), &plan.output);
        let anonymize_plan = anonymizer
            .as_ref()
            .map(|a| a.column_plan(&plan.output))
            .unwrap_or_default();
        let skip_rows = self.options.skip_rows_with_empty_mandatory_values;

        for (file_idx, column_set) in &plan.contributors {
            if failed.contains(file_idx) {
                continue;
            }
            let input = &mut files[*file_idx];
            let sheet = match input.workbook.read_sheet(sheet_name) {
                Ok(Some(sheet)) => sheet,
                Ok(None) => continue,
                Err(err) if self.options.skip_invalid_files => {
                    warn!("Skipping {:?}: {err:#}", input.file.name);
                    issues.push(ValidationIssue::new(
                        &input.file.name,
                        true,
                        format!("Unable to read sheet '{sheet_name}': {err:#}"),
                    ));
                    failed.insert(*file_idx);
                    continue;
                }
                Err(err) => return Err(self.fail(MergeError::read(&input.file.path, err))),
            };
            let file = &input.file;
            let mapping = map_columns(column_set, &plan.output);
            let before = rows.len();

            for (row_idx, source) in sheet.data_rows().enumerate() {
                if row_is_blank(source) {
                    continue;
                }
                let mut record = vec![CellValue::Blank; plan.output.len()];
                for &(src, dst) in &mapping.pairs {
                    if let Some(cell) = source.get(src) {
                        record[dst] = cell.clone();
                    }
                }

                let empty = row_check.empty_mandatory(&record);
                if !empty.is_empty() {
                    let action = if skip_rows { "row removed" } else { "row kept" };
                    issues.push(ValidationIssue::new(
                        &file.name,
                        false,
                        format!(
                            "Sheet '{sheet_name}' row {}: empty mandatory value(s) {} ({action})",
                            row_idx + 2,
                            empty.join(", ")
                        ),
                    ));
                    if skip_rows {
                        continue;
                    }
                }

                let original =
                    (validator.is_some() && anonymizer.is_some()).then(|| record.clone());
                if let Some(anonymizer) = anonymizer.as_deref_mut() {
                    anonymizer.anonymize_row(&mut record, &anonymize_plan, &file.name);
                }
                if let Some(idx) = plan.output.source_file_index {
                    record[idx] = CellValue::text(file.name.as_str());
                }
                if let Some(validator) = validator.as_deref_mut() {
                    let values = original.as_deref().unwrap_or(&record);
                    if !validator.check_values(&file.name, values, &record) {
                        continue;
                    }
                }
                rows.push(record);
            }
            debug!(
                "{:?}: {} row(s) merged into '{}'",
                file.name,
                rows.len() - before,
                sheet_name
            );
        }
        Ok(rows)
    }

    fn enter(&mut self, stage: MergeStage) {
        debug!("Merge stage {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn fail(&mut self, err: MergeError) -> MergeError {
        error!("Merge failed during {:?}: {err}", self.stage);
        self.stage = MergeStage::Failed;
        err
    }
}
