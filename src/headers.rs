//! Header resolution: raw header cells → canonical column names.

use anyhow::Result;
use log::debug;

use crate::{
    config::{MergeConfig, SheetSchema},
    workbook::{SheetData, SourceWorkbook},
};

/// One resolved header cell: its position in the source sheet and its canonical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub source_index: usize,
    pub name: String,
}

/// Canonical columns present in one file's sheet, in sheet order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileColumnSet {
    pub columns: Vec<ResolvedColumn>,
}

impl FileColumnSet {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Resolves raw header strings. Blank headers are skipped; headers without an
/// alias keep their raw text; duplicates are kept.
pub fn resolve_headers(raw_headers: &[String], schema: Option<&SheetSchema>) -> FileColumnSet {
    let columns = raw_headers
        .iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            let name = match schema {
                Some(schema) => schema.canonical_name(trimmed),
                None => trimmed,
            };
            if name != trimmed {
                debug!("Header '{trimmed}' resolved to '{name}'");
            }
            Some(ResolvedColumn {
                source_index: idx,
                name: name.to_string(),
            })
        })
        .collect();
    FileColumnSet { columns }
}

pub fn resolve_sheet(sheet: &SheetData, schema: Option<&SheetSchema>) -> FileColumnSet {
    resolve_headers(&sheet.header_row(), schema)
}

/// Headers of every configured sheet in configuration order; `None` where the
/// workbook lacks the sheet.
pub fn resolve_workbook(
    config: &MergeConfig,
    workbook: &mut dyn SourceWorkbook,
) -> Result<Vec<Option<FileColumnSet>>> {
    config
        .sheets
        .iter()
        .map(|schema| {
            Ok(workbook
                .read_sheet(&schema.name)?
                .map(|sheet| resolve_sheet(&sheet, Some(schema))))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SheetSchema {
        SheetSchema::new(
            "vInfo",
            &["VM"],
            &[("vInfoVMName", "VM"), ("VM Name", "VM"), ("vInfoCPUs", "CPUs")],
        )
    }

    fn headers(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn aliases_resolve_and_unknown_headers_pass_through() {
        let resolved = resolve_headers(
            &headers(&["vInfoVMName", "vInfoCPUs", "Annotation"]),
            Some(&schema()),
        );
        assert_eq!(
            resolved.names().collect::<Vec<_>>(),
            vec!["VM", "CPUs", "Annotation"]
        );
    }

    #[test]
    fn blank_headers_are_skipped_but_positions_kept() {
        let resolved = resolve_headers(&headers(&["VM", "", "  ", "CPUs"]), Some(&schema()));
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.columns[0].source_index, 0);
        assert_eq!(resolved.columns[1].source_index, 3);
    }

    #[test]
    fn duplicate_canonical_names_are_tolerated() {
        let resolved = resolve_headers(&headers(&["vInfoVMName", "VM Name"]), Some(&schema()));
        assert_eq!(resolved.names().collect::<Vec<_>>(), vec!["VM", "VM"]);
    }

    #[test]
    fn missing_schema_keeps_raw_headers() {
        let resolved = resolve_headers(&headers(&[" vInfoVMName "]), None);
        assert_eq!(resolved.names().collect::<Vec<_>>(), vec!["vInfoVMName"]);
        assert!(resolved.contains("vInfoVMName"));
    }
}
