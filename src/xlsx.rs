//! `.xlsx` codec backed by `calamine` (read) and `rust_xlsxwriter` (write).

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use calamine::{Data, Range, Reader, Sheets, open_workbook_auto};
use log::debug;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::{
    data::CellValue,
    workbook::{OutputSheet, OutputWorkbook, SheetData, SourceWorkbook, SpreadsheetAccess},
};

const DATE_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxAccess;

struct XlsxWorkbook {
    inner: Sheets<BufReader<File>>,
    names: Vec<String>,
}

impl SourceWorkbook for XlsxWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn read_sheet(&mut self, name: &str) -> Result<Option<SheetData>> {
        if !self.sheet_exists(name) {
            return Ok(None);
        }
        let range = self
            .inner
            .worksheet_range(name)
            .with_context(|| format!("Reading sheet '{name}'"))?;
        Ok(Some(range_to_sheet(&range)))
    }
}

impl SpreadsheetAccess for XlsxAccess {
    fn open_workbook(&self, path: &Path) -> Result<Box<dyn SourceWorkbook>> {
        let inner: Sheets<BufReader<File>> =
            open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
        let names = inner.sheet_names();
        debug!("Opened {:?} with sheets {:?}", path, names);
        Ok(Box::new(XlsxWorkbook { inner, names }))
    }

    fn save_workbook(&self, workbook: &OutputWorkbook, path: &Path) -> Result<()> {
        let mut book = Workbook::new();
        let header_format = Format::new().set_bold();
        let date_format = Format::new().set_num_format(DATE_FORMAT);
        for sheet in &workbook.sheets {
            let worksheet = book.add_worksheet();
            write_sheet(worksheet, sheet, &header_format, &date_format)
                .with_context(|| format!("Writing sheet '{}'", sheet.name))?;
        }
        book.save(path)
            .with_context(|| format!("Saving workbook {path:?}"))
    }
}

fn range_to_sheet(range: &Range<Data>) -> SheetData {
    let Some((end_row, end_col)) = range.end() else {
        return SheetData::default();
    };
    let rows = (0..=end_row)
        .map(|row| {
            (0..=end_col)
                .map(|col| {
                    range
                        .get_value((row, col))
                        .map(convert_cell)
                        .unwrap_or(CellValue::Blank)
                })
                .collect()
        })
        .collect();
    SheetData::new(rows)
}

fn convert_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Blank,
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(parsed) => CellValue::Date(parsed),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
    }
}

fn write_sheet(
    worksheet: &mut Worksheet,
    sheet: &OutputSheet,
    header_format: &Format,
    date_format: &Format,
) -> Result<(), XlsxError> {
    worksheet.set_name(&sheet.name)?;
    for (col, header) in sheet.header.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, header_format)?;
    }
    for (idx, row) in sheet.rows.iter().enumerate() {
        let row_num = (idx + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                CellValue::Blank => {}
                CellValue::Text(s) => {
                    worksheet.write_string(row_num, col, s)?;
                }
                CellValue::Number(n) => {
                    worksheet.write_number(row_num, col, *n)?;
                }
                CellValue::Boolean(b) => {
                    worksheet.write_boolean(row_num, col, *b)?;
                }
                CellValue::Date(dt) => {
                    worksheet.write_datetime_with_format(row_num, col, dt, date_format)?;
                }
            }
        }
    }
    if !sheet.header.is_empty() {
        worksheet.autofilter(0, 0, sheet.rows.len() as u32, (sheet.header.len() - 1) as u16)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    #[test]
    fn saved_workbook_reads_back_with_types() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("roundtrip.xlsx");
        let created = NaiveDate::from_ymd_opt(2023, 11, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        let mut workbook = OutputWorkbook::default();
        let sheet = workbook.add_sheet(
            "vInfo",
            vec![
                "VM".to_string(),
                "CPUs".to_string(),
                "Template".to_string(),
                "Creation date".to_string(),
                "Annotation".to_string(),
            ],
        );
        sheet.push_row(vec![
            CellValue::text("web-01"),
            CellValue::Number(4.0),
            CellValue::Boolean(false),
            CellValue::Date(created),
            CellValue::Blank,
        ]);
        XlsxAccess.save_workbook(&workbook, &path).expect("save");

        let mut reopened = XlsxAccess.open_workbook(&path).expect("open");
        assert_eq!(reopened.sheet_names(), vec!["vInfo".to_string()]);
        let data = reopened.read_sheet("vInfo").expect("read").expect("sheet");
        assert_eq!(
            data.header_row(),
            vec!["VM", "CPUs", "Template", "Creation date", "Annotation"]
        );
        assert_eq!(data.cell(1, 0), &CellValue::text("web-01"));
        assert_eq!(data.cell(1, 1), &CellValue::Number(4.0));
        assert_eq!(data.cell(1, 2), &CellValue::Boolean(false));
        assert_eq!(data.cell(1, 3), &CellValue::Date(created));
        assert!(data.cell(1, 4).is_blank());
        assert!(reopened.read_sheet("vHost").expect("read").is_none());
    }

    #[test]
    fn opening_missing_file_fails_with_path_context() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("absent.xlsx");
        let err = XlsxAccess.open_workbook(&path).err().expect("missing file");
        assert!(format!("{err:#}").contains("absent.xlsx"));
    }
}
