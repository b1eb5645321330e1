//! Opt-in validation of the primary inventory sheet: identifier presence and
//! uniqueness, OS-configuration presence, and a ceiling on accepted rows.
//!
//! Classification order for a row:
//!
//! 1. Once `limit` rows were accepted, every further row is `VmCountExceeded`
//!    and no other check runs.
//! 2. Blank identifier → `MissingIdentifier`; blank OS field → `MissingOsConfiguration`.
//! 3. Identifier already accepted earlier in the run → `DuplicateIdentifier`.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use serde::Serialize;

use crate::{columns::OutputColumnSet, config::MergeConfig, data::CellValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FailureReason {
    MissingIdentifier,
    MissingOsConfiguration,
    DuplicateIdentifier,
    VmCountExceeded,
}

impl FailureReason {
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::MissingIdentifier => "Missing identifier",
            FailureReason::MissingOsConfiguration => "Missing OS configuration",
            FailureReason::DuplicateIdentifier => "Duplicate identifier",
            FailureReason::VmCountExceeded => "VM count exceeded",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedValidationFailure {
    pub file_name: String,
    pub reason: FailureReason,
    pub row: Vec<CellValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtendedValidationSummary {
    pub counts: BTreeMap<FailureReason, usize>,
    pub limit_reached: bool,
    pub skipped_after_limit: usize,
    pub accepted: usize,
}

#[derive(Debug)]
pub struct ExtendedValidator {
    identifier_index: Option<usize>,
    os_index: Option<usize>,
    limit: usize,
    seen: HashSet<String>,
    failures: Vec<ExtendedValidationFailure>,
    summary: ExtendedValidationSummary,
}

impl ExtendedValidator {
    pub fn new(config: &MergeConfig, output: &OutputColumnSet, limit: usize) -> Self {
        Self {
            identifier_index: output.position(&config.identifier_column),
            os_index: output.position(&config.os_configuration_column),
            limit,
            seen: HashSet::new(),
            failures: Vec::new(),
            summary: ExtendedValidationSummary::default(),
        }
    }

    /// Returns true when the row may be merged; otherwise records the failure.
    pub fn check(&mut self, file_name: &str, row: &[CellValue]) -> bool {
        self.check_values(file_name, row, row)
    }

    /// Classifies `values` but records `snapshot` as the failed row, so checks
    /// can run on source values while the failure report holds emitted ones.
    pub fn check_values(
        &mut self,
        file_name: &str,
        values: &[CellValue],
        snapshot: &[CellValue],
    ) -> bool {
        match self.classify(values) {
            Ok(identifier) => {
                self.seen.insert(identifier);
                self.summary.accepted += 1;
                true
            }
            Err(reason) => {
                if reason == FailureReason::VmCountExceeded {
                    self.summary.limit_reached = true;
                    self.summary.skipped_after_limit += 1;
                }
                *self.summary.counts.entry(reason).or_insert(0) += 1;
                self.failures.push(ExtendedValidationFailure {
                    file_name: file_name.to_string(),
                    reason,
                    row: snapshot.to_vec(),
                });
                false
            }
        }
    }

    fn classify(&self, row: &[CellValue]) -> Result<String, FailureReason> {
        if self.summary.accepted >= self.limit {
            return Err(FailureReason::VmCountExceeded);
        }
        let identifier = cell_text(row, self.identifier_index)
            .ok_or(FailureReason::MissingIdentifier)?;
        if cell_text(row, self.os_index).is_none() {
            return Err(FailureReason::MissingOsConfiguration);
        }
        if self.seen.contains(&identifier) {
            return Err(FailureReason::DuplicateIdentifier);
        }
        Ok(identifier)
    }

    pub fn summary(&self) -> &ExtendedValidationSummary {
        &self.summary
    }

    pub fn into_parts(self) -> (Vec<ExtendedValidationFailure>, ExtendedValidationSummary) {
        (self.failures, self.summary)
    }
}

fn cell_text(row: &[CellValue], index: Option<usize>) -> Option<String> {
    let cell = row.get(index?)?;
    if cell.is_blank() {
        None
    } else {
        Some(cell.as_display().trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(limit: usize) -> ExtendedValidator {
        let config = MergeConfig::default();
        let output = OutputColumnSet::new(vec![
            "VM".to_string(),
            config.identifier_column.clone(),
            config.os_configuration_column.clone(),
        ]);
        ExtendedValidator::new(&config, &output, limit)
    }

    fn row(vm: &str, uuid: &str, os: &str) -> Vec<CellValue> {
        vec![CellValue::from(vm), CellValue::from(uuid), CellValue::from(os)]
    }

    #[test]
    fn rows_beyond_limit_are_counted_as_exceeded() {
        let mut validator = validator(2);
        let accepted = (1..=5)
            .filter(|i| validator.check("a.xlsx", &row("vm", &format!("uuid-{i}"), "Linux")))
            .count();
        assert_eq!(accepted, 2);

        let (failures, summary) = validator.into_parts();
        assert!(summary.limit_reached);
        assert_eq!(summary.skipped_after_limit, 3);
        assert_eq!(summary.counts.get(&FailureReason::VmCountExceeded), Some(&3));
        assert_eq!(failures.len(), 3);
    }

    #[test]
    fn first_occurrence_of_identifier_is_never_flagged() {
        let mut validator = validator(10);
        assert!(validator.check("a.xlsx", &row("web", "uuid-1", "Linux")));
        assert!(!validator.check("b.xlsx", &row("web", "uuid-1", "Linux")));
        assert!(!validator.check("b.xlsx", &row("web", " uuid-1 ", "Linux")));
        let summary = validator.summary();
        assert_eq!(summary.counts.get(&FailureReason::DuplicateIdentifier), Some(&2));
        assert_eq!(summary.accepted, 1);
        assert!(!summary.limit_reached);
    }

    #[test]
    fn missing_fields_take_precedence_over_duplicates() {
        let mut validator = validator(10);
        assert!(validator.check("a.xlsx", &row("web", "uuid-1", "Linux")));
        assert!(!validator.check("a.xlsx", &row("web", "uuid-1", "")));
        assert!(!validator.check("a.xlsx", &row("web", "", "Linux")));
        let (failures, _) = validator.into_parts();
        let reasons = failures.iter().map(|f| f.reason).collect::<Vec<_>>();
        assert_eq!(
            reasons,
            vec![
                FailureReason::MissingOsConfiguration,
                FailureReason::MissingIdentifier
            ]
        );
    }

    #[test]
    fn limit_short_circuits_other_checks() {
        let mut validator = validator(1);
        assert!(validator.check("a.xlsx", &row("web", "uuid-1", "Linux")));
        assert!(!validator.check("a.xlsx", &row("web", "", "")));
        let (failures, summary) = validator.into_parts();
        assert_eq!(failures[0].reason, FailureReason::VmCountExceeded);
        assert_eq!(summary.counts.len(), 1);
    }

    #[test]
    fn failed_rows_do_not_consume_the_limit() {
        let mut validator = validator(1);
        assert!(!validator.check("a.xlsx", &row("web", "", "Linux")));
        assert!(validator.check("a.xlsx", &row("db", "uuid-2", "Linux")));
        assert!(!validator.summary().limit_reached);
    }

    #[test]
    fn classification_uses_values_but_records_snapshot() {
        let mut validator = validator(10);
        assert!(validator.check_values("a.xlsx", &row("web", "uuid-1", "Linux"), &row("vm1", "id1", "Linux")));
        assert!(!validator.check_values("b.xlsx", &row("web", "uuid-1", "Linux"), &row("vm2", "id2", "Linux")));
        let (failures, _) = validator.into_parts();
        assert_eq!(failures[0].reason, FailureReason::DuplicateIdentifier);
        assert_eq!(failures[0].row, row("vm2", "id2", "Linux"));
    }

    #[test]
    fn missing_identifier_column_flags_every_row() {
        let config = MergeConfig::default();
        let output = OutputColumnSet::new(vec!["VM".to_string()]);
        let mut validator = ExtendedValidator::new(&config, &output, 10);
        assert!(!validator.check("a.xlsx", &[CellValue::text("web")]));
        assert_eq!(
            validator.summary().counts.get(&FailureReason::MissingIdentifier),
            Some(&1)
        );
    }
}
