pub mod anonymize;
pub mod cli;
pub mod columns;
pub mod config;
pub mod data;
pub mod error;
pub mod extended;
pub mod headers;
pub mod io_utils;
pub mod merge;
pub mod output;
pub mod table;
pub mod validate;
pub mod workbook;
pub mod xlsx;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands},
    config::{MergeConfig, MergeOptions},
    merge::{InputFile, Merger},
    validate::ValidationIssue,
    workbook::SpreadsheetAccess,
    xlsx::XlsxAccess,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("inventory_merge", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Merge(args) => handle_merge(&args),
        Commands::Check(args) => handle_check(&args),
        Commands::Sheets(args) => handle_sheets(&args),
        Commands::Config(args) => handle_config(&args),
    }
}

fn load_config(path: Option<&Path>) -> Result<MergeConfig> {
    match path {
        Some(path) => {
            let config = MergeConfig::load(path)
                .with_context(|| format!("Loading merge configuration from {path:?}"))?;
            info!("Loaded merge configuration from {:?}", path);
            Ok(config)
        }
        None => {
            debug!("Using built-in merge configuration");
            Ok(MergeConfig::default())
        }
    }
}

fn handle_merge(args: &cli::MergeArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let options = args.options();
    let inputs = io_utils::collect_inputs(&args.inputs, Some(&args.output))?;
    info!(
        "Merging {} workbook(s) into {:?}",
        inputs.len(),
        args.output
    );

    let access = XlsxAccess;
    let mut merger = Merger::new(&access, &config, &options);
    let report = merger.run(&inputs, &args.output)?;

    for warning in &report.warnings {
        debug!("Warning: {warning}");
    }
    if let Some(path) = &args.issues_csv {
        output::write_issues_csv(path, &report.issues)
            .with_context(|| format!("Writing issues to {path:?}"))?;
        info!("✓ Wrote {} issue(s) to {:?}", report.issues.len(), path);
    }
    if let Some(path) = &args.report {
        output::write_json_report(path, &report)
            .with_context(|| format!("Writing report to {path:?}"))?;
    }
    if !report.issues.is_empty() && args.issues_csv.is_none() {
        print!("{}", table::issues_table(&report.issues));
        println!();
    }
    print!("{}", table::merge_summary(&report));
    Ok(())
}

fn handle_check(args: &cli::CheckArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let options = MergeOptions {
        ignore_missing_optional_sheets: args.ignore_missing_optional_sheets,
        ..MergeOptions::default()
    };
    let inputs = io_utils::collect_inputs(&args.inputs, None)?;
    if inputs.is_empty() {
        bail!(error::MergeError::NoInputFiles);
    }

    let issues = check_files(&XlsxAccess, &config, &options, &inputs);
    let invalid = issues
        .iter()
        .map(|issue| issue.file_name.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    if issues.is_empty() {
        info!("✓ {} workbook(s) passed validation", inputs.len());
        return Ok(());
    }
    print!("{}", table::issues_table(&issues));
    bail!(
        "{} of {} workbook(s) failed validation",
        invalid,
        inputs.len()
    )
}

/// File-level validation of every input; unreadable files become issues.
pub fn check_files(
    access: &dyn SpreadsheetAccess,
    config: &MergeConfig,
    options: &MergeOptions,
    inputs: &[std::path::PathBuf],
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for path in inputs {
        let file = InputFile::new(path);
        let result = access.open_workbook(path).and_then(|mut workbook| {
            let headers = headers::resolve_workbook(config, workbook.as_mut())?;
            Ok(validate::validate_file(config, options, &*workbook, &headers))
        });
        match result {
            Ok(problems) => {
                if problems.is_empty() {
                    info!("✓ {:?}", file.name);
                }
                for problem in problems {
                    warn!("{:?}: {problem}", file.name);
                    issues.push(ValidationIssue::new(&file.name, false, problem));
                }
            }
            Err(err) => {
                warn!("{:?}: {err:#}", file.name);
                issues.push(ValidationIssue::new(
                    &file.name,
                    false,
                    format!("Unable to read workbook: {err:#}"),
                ));
            }
        }
    }
    issues
}

fn handle_sheets(args: &cli::SheetsArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    print!("{}", table::sheet_listing(&config));
    Ok(())
}

fn handle_config(args: &cli::ConfigArgs) -> Result<()> {
    let config = MergeConfig::default();
    config
        .save(&args.output)
        .with_context(|| format!("Writing merge configuration to {:?}", args.output))?;
    info!("✓ Wrote default merge configuration to {:?}", args.output);
    Ok(())
}
