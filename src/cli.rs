use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{DEFAULT_MAX_ROW_LIMIT, MergeOptions};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Harmonize and merge RVTools inventory workbooks",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge inventory workbooks into a single harmonized workbook
    Merge(MergeArgs),
    /// Validate inventory workbooks without merging them
    Check(CheckArgs),
    /// List the configured sheets and their mandatory columns
    Sheets(SheetsArgs),
    /// Write the built-in merge configuration as YAML
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Input workbooks or directories containing .xlsx files (repeatable)
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// Destination workbook for the merged sheets
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// YAML merge configuration (built-in RVTools layout when omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Do not treat missing optional sheets as a validation failure
    #[arg(long = "ignore-missing-optional-sheets")]
    pub ignore_missing_optional_sheets: bool,
    /// Drop files that fail validation instead of merging them anyway
    #[arg(long = "skip-invalid-files")]
    pub skip_invalid_files: bool,
    /// Replace sensitive names with generated pseudonyms
    #[arg(long)]
    pub anonymize: bool,
    /// Assign pseudonyms independently per source file (implies --anonymize)
    #[arg(long = "anonymize-per-file")]
    pub anonymize_per_file: bool,
    /// Keep only the configured mandatory columns
    #[arg(long = "only-mandatory-columns")]
    pub only_mandatory_columns: bool,
    /// Append a column naming the source file of every row
    #[arg(long = "include-source")]
    pub include_source: bool,
    /// Drop rows whose mandatory cells are empty instead of only reporting them
    #[arg(long = "skip-empty-values")]
    pub skip_empty_values: bool,
    /// Check identifiers, OS configuration, and the row limit on the primary sheet
    #[arg(long = "extended-validation")]
    pub extended_validation: bool,
    /// Maximum number of primary-sheet rows accepted by extended validation
    #[arg(long = "max-vm-count", default_value_t = DEFAULT_MAX_ROW_LIMIT)]
    pub max_vm_count: usize,
    /// Write a JSON merge report to this path (`-` for stdout)
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Write validation issues as CSV to this path (`-` for stdout)
    #[arg(long = "issues-csv")]
    pub issues_csv: Option<PathBuf>,
}

impl MergeArgs {
    pub fn options(&self) -> MergeOptions {
        MergeOptions {
            ignore_missing_optional_sheets: self.ignore_missing_optional_sheets,
            skip_invalid_files: self.skip_invalid_files,
            anonymize: self.anonymize || self.anonymize_per_file,
            anonymize_per_file: self.anonymize_per_file,
            only_mandatory_columns: self.only_mandatory_columns,
            include_source_file_name: self.include_source,
            skip_rows_with_empty_mandatory_values: self.skip_empty_values,
            extended_validation: self.extended_validation,
            max_row_limit: self.max_vm_count,
        }
    }
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Input workbooks or directories containing .xlsx files (repeatable)
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// YAML merge configuration (built-in RVTools layout when omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Do not treat missing optional sheets as a validation failure
    #[arg(long = "ignore-missing-optional-sheets")]
    pub ignore_missing_optional_sheets: bool,
}

#[derive(Debug, Args)]
pub struct SheetsArgs {
    /// YAML merge configuration (built-in RVTools layout when omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Destination YAML file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}
