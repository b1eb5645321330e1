use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    config::MergeConfig,
    merge::MergeReport,
    validate::ValidationIssue,
};

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

/// Per-sheet row and column counts followed by the totals.
pub fn merge_summary(report: &MergeReport) -> String {
    let headers = ["Sheet", "Rows", "Columns"].map(String::from).to_vec();
    let rows = report
        .sheets
        .iter()
        .map(|s| vec![s.name.clone(), s.rows.to_string(), s.columns.to_string()])
        .collect::<Vec<_>>();

    let mut output = render_table(&headers, &rows);
    let _ = writeln!(
        output,
        "\nFiles merged: {} of {}",
        report.files_processed, report.files_supplied
    );
    let skipped = report.issues.iter().filter(|i| i.skipped).count();
    if !report.issues.is_empty() {
        let _ = writeln!(
            output,
            "Issues: {} ({} skipped file(s))",
            report.issues.len(),
            skipped
        );
    }
    let anonymized = report
        .anonymized
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(name, count)| format!("{name}={count}"))
        .collect::<Vec<_>>();
    if !anonymized.is_empty() {
        let _ = writeln!(output, "Anonymized: {}", anonymized.join(", "));
    }
    if let Some(extended) = &report.extended_validation {
        let failures = extended.counts.values().sum::<usize>();
        let _ = writeln!(
            output,
            "Extended validation: {} accepted, {} rejected{}",
            extended.accepted,
            failures,
            if extended.limit_reached {
                " (row limit reached)"
            } else {
                ""
            }
        );
    }
    output
}

pub fn issues_table(issues: &[ValidationIssue]) -> String {
    let headers = ["File", "Skipped", "Message"].map(String::from).to_vec();
    let rows = issues
        .iter()
        .map(|i| {
            vec![
                i.file_name.clone(),
                if i.skipped { "yes" } else { "no" }.to_string(),
                i.message.clone(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

/// Configured sheets with their role, mandatory columns, and alias count.
pub fn sheet_listing(config: &MergeConfig) -> String {
    let headers = ["Sheet", "Role", "Mandatory Columns", "Aliases"]
        .map(String::from)
        .to_vec();
    let rows = config
        .sheets
        .iter()
        .map(|schema| {
            vec![
                schema.name.clone(),
                if config.is_required_sheet(&schema.name) {
                    "required"
                } else {
                    "optional"
                }
                .to_string(),
                schema.mandatory_columns.join(", "),
                schema.aliases.len().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let sanitized = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&sanitized));
            format!("{}{}", sanitized, " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI escape, e.g. \x1b[31m
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
