//! Cross-file column resolution.
//!
//! Given the [`FileColumnSet`] of every file that contains a sheet, computes the
//! [`OutputColumnSet`] used by the merged sheet and maps each file's source
//! columns onto it.
//!
//! ## Rules
//!
//! - Output columns are the intersection of all file column sets, iterated in
//!   the first file's order, each name appearing once.
//! - In mandatory-only mode the intersection is further limited to the sheet's
//!   mandatory columns.
//! - Configured mandatory columns missing from the result are reported, never fatal.
//! - The synthetic source-file column is appended last when requested.

use std::collections::HashSet;

use itertools::Itertools;

use crate::{config::SheetSchema, headers::FileColumnSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputColumnSet {
    pub columns: Vec<String>,
    /// Position of the synthetic source-file column, when present.
    pub source_file_index: Option<usize>,
}

impl OutputColumnSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            source_file_index: None,
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateOptions<'a> {
    pub only_mandatory_columns: bool,
    /// Name of the synthetic source-file column to append, if any.
    pub source_file_column: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub output: OutputColumnSet,
    /// Configured mandatory columns that did not make it into the output.
    pub missing_mandatory: Vec<String>,
}

/// Computes the merged column set for one sheet.
pub fn aggregate(
    schema: Option<&SheetSchema>,
    file_sets: &[FileColumnSet],
    options: AggregateOptions<'_>,
) -> Aggregation {
    let Some((first, rest)) = file_sets.split_first() else {
        return Aggregation::default();
    };

    let others = rest
        .iter()
        .map(|set| set.names().collect::<HashSet<_>>())
        .collect::<Vec<_>>();
    let mut columns = first
        .names()
        .unique()
        .filter(|name| others.iter().all(|set| set.contains(name)))
        .map(str::to_string)
        .collect::<Vec<_>>();

    if options.only_mandatory_columns {
        match schema {
            Some(schema) => columns.retain(|name| schema.is_mandatory(name)),
            None => columns.clear(),
        }
    }

    let missing_mandatory = schema
        .map(|schema| {
            schema
                .mandatory_columns
                .iter()
                .filter(|name| !columns.contains(*name))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let mut output = OutputColumnSet::new(columns);
    if let Some(source_column) = options.source_file_column {
        let index = match output.position(source_column) {
            Some(existing) => existing,
            None => {
                output.columns.push(source_column.to_string());
                output.columns.len() - 1
            }
        };
        output.source_file_index = Some(index);
    }

    Aggregation {
        output,
        missing_mandatory,
    }
}

/// (source-column-index, output-column-index) pairs for one file's sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pub pairs: Vec<(usize, usize)>,
}

/// Maps file columns onto output positions by canonical name. Columns absent from
/// the output are dropped; the first source column claims a duplicated name.
pub fn map_columns(file: &FileColumnSet, output: &OutputColumnSet) -> ColumnMapping {
    let mut claimed = vec![false; output.len()];
    let pairs = file
        .columns
        .iter()
        .filter_map(|column| {
            let target = output.position(&column.name)?;
            if claimed[target] {
                return None;
            }
            claimed[target] = true;
            Some((column.source_index, target))
        })
        .collect();
    ColumnMapping { pairs }
}
