#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use inventory_merge::{
    config::{AnonymizationCategory, MergeConfig, SheetSchema},
    data::CellValue,
    workbook::{MemoryAccess, OutputWorkbook, SheetData, SpreadsheetAccess},
    xlsx::XlsxAccess,
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// Writes a real `.xlsx` file with the given sheets and returns its path.
    pub fn write_workbook(&self, name: &str, sheets: &[(&str, SheetData)]) -> PathBuf {
        let path = self.join(name);
        let mut workbook = OutputWorkbook::default();
        for (sheet_name, data) in sheets {
            let header = data.header_row();
            let sheet = workbook.add_sheet(sheet_name, header);
            for row in data.data_rows() {
                sheet.push_row(row.to_vec());
            }
        }
        XlsxAccess
            .save_workbook(&workbook, &path)
            .expect("write xlsx fixture");
        path
    }
}

/// Builds a sheet from a header and text rows; empty strings become blank cells.
pub fn sheet(header: &[&str], rows: &[&[&str]]) -> SheetData {
    let rows = rows
        .iter()
        .map(|row| row.iter().map(|cell| CellValue::from(*cell)).collect())
        .collect::<Vec<Vec<CellValue>>>();
    SheetData::from_text(header, &rows)
}

/// Registers an in-memory workbook at `path`.
pub fn add_workbook(access: &MemoryAccess, path: &str, sheets: Vec<(&str, SheetData)>) -> PathBuf {
    access.insert(
        path,
        sheets
            .into_iter()
            .map(|(name, data)| (name.to_string(), data))
            .collect(),
    );
    PathBuf::from(path)
}

/// Compact two-sheet configuration used by the merge scenarios.
pub fn small_config() -> MergeConfig {
    MergeConfig {
        required_sheet: "vInfo".to_string(),
        os_configuration_column: "OS".to_string(),
        identifier_column: "VM UUID".to_string(),
        source_file_column: "Source File".to_string(),
        sheets: vec![
            SheetSchema::new(
                "vInfo",
                &["VM", "Host", "OS"],
                &[("vInfoVMName", "VM"), ("vInfoHost", "Host"), ("vInfoUUID", "VM UUID")],
            ),
            SheetSchema::new("vHost", &["Host"], &[("vHostName", "Host")]),
        ],
        anonymization: vec![
            AnonymizationCategory {
                name: "vm".to_string(),
                column: "VM".to_string(),
                prefix: "vm".to_string(),
            },
            AnonymizationCategory {
                name: "host".to_string(),
                column: "Host".to_string(),
                prefix: "host".to_string(),
            },
        ],
    }
}

/// Text rendering of a sheet's rows for compact assertions.
pub fn texts(rows: &[Vec<CellValue>]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(CellValue::as_display).collect())
        .collect()
}
