//! Spreadsheet access boundary.
//!
//! The merge engine never touches a file format directly. It opens workbooks
//! through [`SpreadsheetAccess`], reads whole sheets as [`SheetData`] grids, and
//! hands finished [`OutputWorkbook`]s back for saving. [`crate::xlsx::XlsxAccess`]
//! is the production codec; [`MemoryAccess`] keeps everything in memory.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};

use crate::data::CellValue;

/// Used range of one sheet. Row 0 is the header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetData {
    rows: Vec<Vec<CellValue>>,
}

impl SheetData {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    pub fn from_text(header: &[&str], rows: &[Vec<CellValue>]) -> Self {
        let mut grid = Vec::with_capacity(rows.len() + 1);
        grid.push(header.iter().map(|h| CellValue::from(*h)).collect());
        grid.extend(rows.iter().cloned());
        Self { rows: grid }
    }

    /// Header cells up to the last used column; blank cells become empty strings.
    pub fn header_row(&self) -> Vec<String> {
        let Some(header) = self.rows.first() else {
            return Vec::new();
        };
        let used = header
            .iter()
            .rposition(|cell| !cell.is_blank())
            .map_or(0, |idx| idx + 1);
        header[..used]
            .iter()
            .map(|cell| {
                if cell.is_blank() {
                    String::new()
                } else {
                    cell.as_display().trim().to_string()
                }
            })
            .collect()
    }

    /// Cell at a zero-based grid position; positions outside the used range are blank.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static BLANK: CellValue = CellValue::Blank;
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .unwrap_or(&BLANK)
    }

    pub fn data_row_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    /// Data rows, excluding the header.
    pub fn data_rows(&self) -> impl Iterator<Item = &[CellValue]> {
        self.rows.iter().skip(1).map(Vec::as_slice)
    }
}

pub trait SourceWorkbook {
    fn sheet_names(&self) -> Vec<String>;

    fn sheet_exists(&self, name: &str) -> bool {
        self.sheet_names().iter().any(|n| n == name)
    }

    /// Reads the whole used range of `name`, or `None` when the sheet is absent.
    fn read_sheet(&mut self, name: &str) -> Result<Option<SheetData>>;
}

pub trait SpreadsheetAccess {
    fn open_workbook(&self, path: &Path) -> Result<Box<dyn SourceWorkbook>>;
    fn save_workbook(&self, workbook: &OutputWorkbook, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl OutputSheet {
    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputWorkbook {
    pub sheets: Vec<OutputSheet>,
}

impl OutputWorkbook {
    pub fn add_sheet(&mut self, name: &str, header: Vec<String>) -> &mut OutputSheet {
        self.sheets.push(OutputSheet {
            name: name.to_string(),
            header,
            rows: Vec::new(),
        });
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    pub fn sheet(&self, name: &str) -> Option<&OutputSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Converts the workbook back into readable sheets, header first.
    pub fn to_sheet_data(&self) -> BTreeMap<String, SheetData> {
        self.sheets
            .iter()
            .map(|sheet| {
                let mut rows = Vec::with_capacity(sheet.rows.len() + 1);
                rows.push(
                    sheet
                        .header
                        .iter()
                        .map(|h| CellValue::from(h.as_str()))
                        .collect(),
                );
                rows.extend(sheet.rows.iter().cloned());
                (sheet.name.clone(), SheetData::new(rows))
            })
            .collect()
    }
}

struct MemoryWorkbook {
    sheets: BTreeMap<String, SheetData>,
    order: Vec<String>,
}

impl SourceWorkbook for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.order.clone()
    }

    fn sheet_exists(&self, name: &str) -> bool {
        self.sheets.contains_key(name)
    }

    fn read_sheet(&mut self, name: &str) -> Result<Option<SheetData>> {
        Ok(self.sheets.get(name).cloned())
    }
}

/// In-memory spreadsheet store keyed by path.
#[derive(Default)]
pub struct MemoryAccess {
    workbooks: RefCell<HashMap<PathBuf, Vec<(String, SheetData)>>>,
    saved: RefCell<HashMap<PathBuf, OutputWorkbook>>,
    opens: RefCell<HashMap<PathBuf, usize>>,
}

impl MemoryAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, sheets: Vec<(String, SheetData)>) {
        self.workbooks.borrow_mut().insert(path.into(), sheets);
    }

    pub fn saved(&self, path: &Path) -> Option<OutputWorkbook> {
        self.saved.borrow().get(path).cloned()
    }

    /// Number of times `path` was opened, successfully or not.
    pub fn open_count(&self, path: &Path) -> usize {
        self.opens.borrow().get(path).copied().unwrap_or(0)
    }

    pub fn saved_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.saved.borrow().keys().cloned().collect::<Vec<_>>();
        paths.sort();
        paths
    }
}

impl SpreadsheetAccess for MemoryAccess {
    fn open_workbook(&self, path: &Path) -> Result<Box<dyn SourceWorkbook>> {
        *self.opens.borrow_mut().entry(path.to_path_buf()).or_insert(0) += 1;
        if let Some(sheets) = self.workbooks.borrow().get(path) {
            return Ok(Box::new(MemoryWorkbook {
                order: sheets.iter().map(|(name, _)| name.clone()).collect(),
                sheets: sheets.iter().cloned().collect(),
            }));
        }
        if let Some(saved) = self.saved.borrow().get(path) {
            return Ok(Box::new(MemoryWorkbook {
                order: saved.sheets.iter().map(|s| s.name.clone()).collect(),
                sheets: saved.to_sheet_data(),
            }));
        }
        Err(anyhow!("Workbook {path:?} does not exist"))
    }

    fn save_workbook(&self, workbook: &OutputWorkbook, path: &Path) -> Result<()> {
        self.saved
            .borrow_mut()
            .insert(path.to_path_buf(), workbook.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SheetData {
        SheetData::new(vec![
            vec![
                CellValue::text("VM"),
                CellValue::Blank,
                CellValue::text(" CPUs "),
                CellValue::Blank,
            ],
            vec![
                CellValue::text("web-01"),
                CellValue::Blank,
                CellValue::Number(4.0),
            ],
        ])
    }

    #[test]
    fn header_row_stops_at_last_used_column() {
        assert_eq!(sample().header_row(), vec!["VM", "", "CPUs"]);
    }

    #[test]
    fn cell_outside_used_range_is_blank() {
        let sheet = sample();
        assert_eq!(sheet.cell(1, 2), &CellValue::Number(4.0));
        assert_eq!(sheet.cell(1, 9), &CellValue::Blank);
        assert_eq!(sheet.cell(7, 0), &CellValue::Blank);
        assert_eq!(sheet.data_row_count(), 1);
    }

    #[test]
    fn memory_access_reopens_saved_workbooks() {
        let access = MemoryAccess::new();
        let mut workbook = OutputWorkbook::default();
        workbook
            .add_sheet("vInfo", vec!["VM".to_string()])
            .push_row(vec![CellValue::text("a")]);
        let path = Path::new("/tmp/out.xlsx");
        access.save_workbook(&workbook, path).unwrap();

        let mut reopened = access.open_workbook(path).unwrap();
        assert!(reopened.sheet_exists("vInfo"));
        let sheet = reopened.read_sheet("vInfo").unwrap().unwrap();
        assert_eq!(sheet.header_row(), vec!["VM"]);
        assert_eq!(sheet.cell(1, 0), &CellValue::text("a"));
        assert!(reopened.read_sheet("vHost").unwrap().is_none());
    }

    #[test]
    fn memory_access_reports_missing_workbook() {
        let access = MemoryAccess::new();
        assert!(access.open_workbook(Path::new("/missing.xlsx")).is_err());
    }
}
