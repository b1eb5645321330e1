//! Deterministic pseudonymization of sensitive columns.
//!
//! Each configured category owns a counter and an append-only map from original
//! value to pseudonym (`vm1`, `vm2`, ...), assigned in first-seen order. With
//! per-file scope the map is keyed by `(source file, original)` while the counter
//! stays per category, so pseudonyms never collide across files.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::{columns::OutputColumnSet, config::AnonymizationCategory, data::CellValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnonymizationScope {
    #[default]
    Run,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Source file the mapping belongs to; `None` in run scope.
    pub file_name: Option<String>,
    pub original: String,
    pub pseudonym: String,
}

#[derive(Debug, Default)]
struct CategoryMap {
    counter: usize,
    lookup: HashMap<(Option<String>, String), usize>,
    entries: Vec<MappingEntry>,
}

#[derive(Debug)]
pub struct Anonymizer {
    scope: AnonymizationScope,
    categories: Vec<AnonymizationCategory>,
    maps: Vec<CategoryMap>,
}

impl Anonymizer {
    pub fn new(categories: &[AnonymizationCategory], scope: AnonymizationScope) -> Self {
        Self {
            scope,
            categories: categories.to_vec(),
            maps: categories.iter().map(|_| CategoryMap::default()).collect(),
        }
    }

    /// Category index per output column; `None` for columns that pass through.
    pub fn column_plan(&self, output: &OutputColumnSet) -> Vec<Option<usize>> {
        output
            .columns
            .iter()
            .map(|column| self.categories.iter().position(|c| &c.column == column))
            .collect()
    }

    /// Replaces the value with the category's pseudonym, allocating one on first sight.
    pub fn anonymize(&mut self, category: usize, value: &CellValue, file_name: &str) -> CellValue {
        if value.is_blank() {
            return value.clone();
        }
        let Some(spec) = self.categories.get(category) else {
            return value.clone();
        };
        let map = &mut self.maps[category];
        let original = value.as_display();
        let scope_key = match self.scope {
            AnonymizationScope::Run => None,
            AnonymizationScope::File => Some(file_name.to_string()),
        };
        let key = (scope_key, original);
        if let Some(&idx) = map.lookup.get(&key) {
            return CellValue::Text(map.entries[idx].pseudonym.clone());
        }
        map.counter += 1;
        let pseudonym = format!("{}{}", spec.prefix, map.counter);
        debug!("Assigned pseudonym '{}' in category '{}'", pseudonym, spec.name);
        let (file_name, original) = key.clone();
        map.entries.push(MappingEntry {
            file_name,
            original,
            pseudonym: pseudonym.clone(),
        });
        map.lookup.insert(key, map.entries.len() - 1);
        CellValue::Text(pseudonym)
    }

    /// Applies `plan` (from [`Anonymizer::column_plan`]) to every cell of `row`.
    pub fn anonymize_row(&mut self, row: &mut [CellValue], plan: &[Option<usize>], file_name: &str) {
        for (cell, category) in row.iter_mut().zip(plan) {
            if let Some(category) = category {
                *cell = self.anonymize(*category, cell, file_name);
            }
        }
    }

    pub fn scope(&self) -> AnonymizationScope {
        self.scope
    }

    /// Number of pseudonyms allocated per category name.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.categories
            .iter()
            .zip(&self.maps)
            .map(|(category, map)| (category.name.clone(), map.counter))
            .collect()
    }

    /// Categories with their entries in first-seen order.
    pub fn mappings(&self) -> impl Iterator<Item = (&AnonymizationCategory, &[MappingEntry])> {
        self.categories
            .iter()
            .zip(&self.maps)
            .map(|(category, map)| (category, map.entries.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn categories() -> Vec<AnonymizationCategory> {
        vec![
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
        ]
    }

    #[test]
    fn same_original_yields_same_pseudonym_across_files() {
        let mut anonymizer = Anonymizer::new(&categories(), AnonymizationScope::Run);
        let secret = CellValue::text("CONFIDENTIAL-01");
        assert_eq!(anonymizer.anonymize(0, &secret, "a.xlsx"), CellValue::text("vm1"));
        assert_eq!(anonymizer.anonymize(0, &secret, "b.xlsx"), CellValue::text("vm1"));
        assert_eq!(
            anonymizer.anonymize(0, &CellValue::text("OTHER"), "b.xlsx"),
            CellValue::text("vm2")
        );
        assert_eq!(anonymizer.counts().get("vm"), Some(&2));
        assert_eq!(anonymizer.counts().get("host"), Some(&0));
    }

    #[test]
    fn categories_have_independent_counters() {
        let mut anonymizer = Anonymizer::new(&categories(), AnonymizationScope::Run);
        let value = CellValue::text("shared-name");
        assert_eq!(anonymizer.anonymize(0, &value, "a.xlsx"), CellValue::text("vm1"));
        assert_eq!(anonymizer.anonymize(1, &value, "a.xlsx"), CellValue::text("host1"));
    }

    #[test]
    fn blank_values_pass_through_without_allocation() {
        let mut anonymizer = Anonymizer::new(&categories(), AnonymizationScope::Run);
        assert_eq!(
            anonymizer.anonymize(0, &CellValue::Blank, "a.xlsx"),
            CellValue::Blank
        );
        assert_eq!(anonymizer.counts().get("vm"), Some(&0));
    }

    #[test]
    fn file_scope_separates_mappings_but_not_counters() {
        let mut anonymizer = Anonymizer::new(&categories(), AnonymizationScope::File);
        let secret = CellValue::text("CONFIDENTIAL-01");
        assert_eq!(anonymizer.anonymize(0, &secret, "a.xlsx"), CellValue::text("vm1"));
        assert_eq!(anonymizer.anonymize(0, &secret, "b.xlsx"), CellValue::text("vm2"));
        assert_eq!(anonymizer.anonymize(0, &secret, "a.xlsx"), CellValue::text("vm1"));
        let (_, entries) = anonymizer.mappings().next().unwrap();
        assert_eq!(entries[1].file_name.as_deref(), Some("b.xlsx"));
    }

    #[test]
    fn anonymize_row_only_touches_planned_columns() {
        let mut anonymizer = Anonymizer::new(&categories(), AnonymizationScope::Run);
        let output = OutputColumnSet::new(vec![
            "Host".to_string(),
            "CPUs".to_string(),
            "VM".to_string(),
        ]);
        let plan = anonymizer.column_plan(&output);
        assert_eq!(plan, vec![Some(1), None, Some(0)]);

        let mut row = vec![
            CellValue::text("esx-01"),
            CellValue::Number(4.0),
            CellValue::text("web-01"),
        ];
        anonymizer.anonymize_row(&mut row, &plan, "a.xlsx");
        assert_eq!(
            row,
            vec![
                CellValue::text("host1"),
                CellValue::Number(4.0),
                CellValue::text("vm1")
            ]
        );
    }

    proptest! {
        #[test]
        fn mapping_is_a_function_and_injective(values in proptest::collection::vec("[a-d]{1,2}", 1..40)) {
            let mut anonymizer = Anonymizer::new(&categories(), AnonymizationScope::Run);
            let mut seen: HashMap<String, CellValue> = HashMap::new();
            for value in &values {
                let pseudonym = anonymizer.anonymize(0, &CellValue::text(value.clone()), "a.xlsx");
                if let Some(previous) = seen.get(value) {
                    prop_assert_eq!(previous, &pseudonym);
                }
                seen.insert(value.clone(), pseudonym);
            }
            let distinct = seen.values().map(CellValue::as_display).collect::<HashSet<_>>();
            prop_assert_eq!(distinct.len(), seen.len());
        }
    }
}
