//! Merge configuration: sheet schemas, header aliases, and run options.
//!
//! [`MergeConfig`] is the immutable description of which sheets are merged,
//! which columns are mandatory for each sheet, and how raw export headers map
//! onto canonical column names. The built-in default matches the RVTools
//! export layout; a YAML document can replace any part of it.
//!
//! [`MergeOptions`] holds the per-run switches supplied on the command line.

use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ROW_LIMIT: usize = 20_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SheetSchema {
    pub name: String,
    #[serde(default)]
    pub mandatory_columns: Vec<String>,
    /// Raw header text → canonical column name.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl SheetSchema {
    pub fn new(name: &str, mandatory: &[&str], aliases: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            mandatory_columns: mandatory.iter().map(|c| c.to_string()).collect(),
            aliases: aliases
                .iter()
                .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
                .collect(),
        }
    }

    /// Unknown headers pass through unchanged.
    pub fn canonical_name<'a>(&'a self, raw: &'a str) -> &'a str {
        self.aliases.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn is_mandatory(&self, column: &str) -> bool {
        self.mandatory_columns.iter().any(|c| c == column)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnonymizationCategory {
    pub name: String,
    pub column: String,
    pub prefix: String,
}

impl AnonymizationCategory {
    fn new(name: &str, column: &str) -> Self {
        Self {
            name: name.to_string(),
            column: column.to_string(),
            prefix: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MergeConfig {
    /// Sheet every input file must contain.
    pub required_sheet: String,
    /// Mandatory column that is exempt from presence and blank-value checks.
    pub os_configuration_column: String,
    /// Column holding the unique row identifier for extended validation.
    pub identifier_column: String,
    /// Name of the synthetic column carrying the source file name.
    pub source_file_column: String,
    pub sheets: Vec<SheetSchema>,
    pub anonymization: Vec<AnonymizationCategory>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            required_sheet: "vInfo".to_string(),
            os_configuration_column: "OS according to the configuration file".to_string(),
            identifier_column: "VM UUID".to_string(),
            source_file_column: "Source File".to_string(),
            sheets: vec![vinfo_schema(), vhost_schema(), vpartition_schema(), vmemory_schema()],
            anonymization: vec![
                AnonymizationCategory::new("vm", "VM"),
                AnonymizationCategory::new("dns", "DNS Name"),
                AnonymizationCategory::new("cluster", "Cluster"),
                AnonymizationCategory::new("host", "Host"),
                AnonymizationCategory::new("datacenter", "Datacenter"),
                AnonymizationCategory::new("ip", "Primary IP Address"),
            ],
        }
    }
}

impl MergeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: MergeConfig =
            serde_yaml::from_reader(reader).context("Parsing merge config YAML")?;
        config
            .validate()
            .with_context(|| format!("Validating config file {path:?}"))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(BufWriter::new(file), self).context("Writing merge config YAML")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.sheets.is_empty(), "Config must define at least one sheet");
        let mut names = HashSet::new();
        for sheet in &self.sheets {
            ensure!(!sheet.name.trim().is_empty(), "Sheet names cannot be empty");
            if !names.insert(sheet.name.as_str()) {
                bail!("Sheet '{}' is defined more than once", sheet.name);
            }
        }
        ensure!(
            names.contains(self.required_sheet.as_str()),
            "Required sheet '{}' is not among the configured sheets",
            self.required_sheet
        );
        let mut categories = HashSet::new();
        for category in &self.anonymization {
            ensure!(
                !category.prefix.is_empty(),
                "Anonymization category '{}' has an empty prefix",
                category.name
            );
            if !categories.insert(category.name.as_str()) {
                bail!(
                    "Anonymization category '{}' is defined more than once",
                    category.name
                );
            }
        }
        Ok(())
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetSchema> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn required_schema(&self) -> Option<&SheetSchema> {
        self.sheet(&self.required_sheet)
    }

    pub fn is_required_sheet(&self, name: &str) -> bool {
        self.required_sheet == name
    }

    /// Mandatory columns of `schema` that must hold a value, i.e. all except the
    /// OS-configuration column.
    pub fn checked_mandatory_columns<'a>(
        &'a self,
        schema: &'a SheetSchema,
    ) -> impl Iterator<Item = &'a str> + 'a {
        schema
            .mandatory_columns
            .iter()
            .map(String::as_str)
            .filter(move |c| *c != self.os_configuration_column)
    }
}

/// Per-run switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub ignore_missing_optional_sheets: bool,
    pub skip_invalid_files: bool,
    pub anonymize: bool,
    /// Scope pseudonyms per source file instead of per run.
    pub anonymize_per_file: bool,
    pub only_mandatory_columns: bool,
    pub include_source_file_name: bool,
    pub skip_rows_with_empty_mandatory_values: bool,
    pub extended_validation: bool,
    pub max_row_limit: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            ignore_missing_optional_sheets: false,
            skip_invalid_files: false,
            anonymize: false,
            anonymize_per_file: false,
            only_mandatory_columns: false,
            include_source_file_name: false,
            skip_rows_with_empty_mandatory_values: false,
            extended_validation: false,
            max_row_limit: DEFAULT_MAX_ROW_LIMIT,
        }
    }
}

fn vinfo_schema() -> SheetSchema {
    SheetSchema::new(
        "vInfo",
        &[
            "VM",
            "Powerstate",
            "Template",
            "SRM Placeholder",
            "CPUs",
            "Memory",
            "NICs",
            "Disks",
            "In Use MiB",
            "Provisioned MiB",
            "OS according to the configuration file",
            "Creation date",
            "Datacenter",
            "Cluster",
            "Host",
        ],
        &[
            ("vInfoVMName", "VM"),
            ("vInfoPowerstate", "Powerstate"),
            ("vInfoTemplate", "Template"),
            ("vInfoSRMPlaceHolder", "SRM Placeholder"),
            ("vInfoCPUs", "CPUs"),
            ("vInfoMemory", "Memory"),
            ("vInfoNICs", "NICs"),
            ("vInfoNumVirtualDisks", "Disks"),
            ("vInfoInUse", "In Use MiB"),
            ("vInfoProvisioned", "Provisioned MiB"),
            ("vInfoOS", "OS according to the configuration file"),
            ("vInfoOSTools", "OS according to the VMware Tools"),
            ("vInfoCreateDate", "Creation date"),
            ("vInfoDataCenter", "Datacenter"),
            ("vInfoCluster", "Cluster"),
            ("vInfoHost", "Host"),
            ("vInfoUUID", "VM UUID"),
            ("vInfoPrimaryIPAddress", "Primary IP Address"),
            ("vInfoDNSName", "DNS Name"),
            ("In Use MB", "In Use MiB"),
            ("Provisioned MB", "Provisioned MiB"),
        ],
    )
}

fn vhost_schema() -> SheetSchema {
    SheetSchema::new(
        "vHost",
        &[
            "Host",
            "Datacenter",
            "Cluster",
            "CPU Model",
            "Speed",
            "# CPU",
            "Cores per CPU",
            "# Cores",
            "CPU usage %",
            "# Memory",
            "Memory usage %",
            "# vCPUs",
            "vCPUs per Core",
        ],
        &[
            ("vHostName", "Host"),
            ("vHostDatacenter", "Datacenter"),
            ("vHostCluster", "Cluster"),
            ("vHostCpuModel", "CPU Model"),
            ("vHostCpuMhz", "Speed"),
            ("vHostNumCPU", "# CPU"),
            ("vHostCoresPerCPU", "Cores per CPU"),
            ("vHostNumCpuCores", "# Cores"),
            ("vHostOverallCpuUsage", "CPU usage %"),
            ("vHostMemorySize", "# Memory"),
            ("vHostOverallMemoryUsage", "Memory usage %"),
            ("vHostvCPUs", "# vCPUs"),
            ("vHostVCPUsPerCore", "vCPUs per Core"),
        ],
    )
}

fn vpartition_schema() -> SheetSchema {
    SheetSchema::new(
        "vPartition",
        &["VM", "Disk", "Capacity MiB", "Consumed MiB"],
        &[
            ("vPartitionVMName", "VM"),
            ("vPartitionDisk", "Disk"),
            ("vPartitionCapacityMiB", "Capacity MiB"),
            ("vPartitionConsumedMiB", "Consumed MiB"),
            ("Capacity MB", "Capacity MiB"),
            ("Consumed MB", "Consumed MiB"),
        ],
    )
}

fn vmemory_schema() -> SheetSchema {
    SheetSchema::new(
        "vMemory",
        &["VM", "Size MiB", "Reservation"],
        &[
            ("vMemoryVMName", "VM"),
            ("vMemorySizeMiB", "Size MiB"),
            ("vMemoryReservation", "Reservation"),
            ("Size MB", "Size MiB"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid_and_requires_vinfo() {
        let config = MergeConfig::default();
        config.validate().expect("default config valid");
        assert_eq!(config.required_schema().unwrap().name, "vInfo");
        assert!(config.is_required_sheet("vInfo"));
        assert!(!config.is_required_sheet("vHost"));
    }

    #[test]
    fn canonical_name_uses_alias_or_passes_through() {
        let config = MergeConfig::default();
        let vinfo = config.sheet("vInfo").unwrap();
        assert_eq!(vinfo.canonical_name("vInfoVMName"), "VM");
        assert_eq!(vinfo.canonical_name("Annotation"), "Annotation");
    }

    #[test]
    fn checked_mandatory_columns_skip_os_configuration() {
        let config = MergeConfig::default();
        let vinfo = config.required_schema().unwrap();
        let checked = config.checked_mandatory_columns(vinfo).collect::<Vec<_>>();
        assert_eq!(checked.len(), vinfo.mandatory_columns.len() - 1);
        assert!(!checked.contains(&"OS according to the configuration file"));
    }

    #[test]
    fn validate_rejects_missing_required_sheet() {
        let config = MergeConfig {
            required_sheet: "vDisk".to_string(),
            ..MergeConfig::default()
        };
        let err = config.validate().expect_err("unknown required sheet");
        assert!(err.to_string().contains("vDisk"));
    }

    #[test]
    fn validate_rejects_duplicate_sheets() {
        let mut config = MergeConfig::default();
        config.sheets.push(SheetSchema::new("vHost", &[], &[]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("merge.yaml");
        std::fs::write(
            &path,
            "required_sheet: Inventory\nsheets:\n  - name: Inventory\n    mandatory_columns: [Name]\n    aliases:\n      VM Name: Name\n",
        )
        .expect("write config");
        let config = MergeConfig::load(&path).expect("load config");
        assert_eq!(config.required_sheet, "Inventory");
        assert_eq!(config.sheets.len(), 1);
        assert_eq!(config.sheets[0].canonical_name("VM Name"), "Name");
        assert_eq!(config.source_file_column, "Source File");
        assert_eq!(config.anonymization.len(), 6);
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("default.yaml");
        let config = MergeConfig::default();
        config.save(&path).expect("save config");
        assert_eq!(MergeConfig::load(&path).expect("load config"), config);
    }

    #[test]
    fn default_options_cap_rows_at_twenty_thousand() {
        let options = MergeOptions::default();
        assert_eq!(options.max_row_limit, 20_000);
        assert!(!options.skip_invalid_files);
    }
}
