//! Static configuration of a resolution pass.
//!
//! Loaded once per invocation and treated as immutable for the rest of the
//! pass.

use std::collections::BTreeMap;
use std::path::Path;
use outsource_core::{CalibrationWindow, Detector, RunNumber, SubsystemSpec};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};
use crate::{Result, SelectionError};

/// Destination key used when a product has no explicit upload destination.
pub const DEFAULT_DESTINATION: &str = "default";

/// How the caller's result cap is applied to the three tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum CapPolicy {
    /// Cap only the baseline tier; readiness tiers are uncapped, so the
    /// worklist is exact
    #[default]
    DiagnosticOnly,
    /// Cap every tier independently
    PerTier,
}

/// Processing state of one named processing context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSpec {
    /// Lineage hash of the processing code, per product
    pub hashes: BTreeMap<String, String>,

    /// Configured calibration model version, per model key
    pub calibration_models: BTreeMap<String, String>,
}

/// Outsource configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutsourceConfig {
    /// Runs below this number are never eligible
    pub min_run_number: RunNumber,

    /// Runs above this number are never eligible
    pub max_run_number: Option<RunNumber>,

    /// Runs carrying any of these tags are excluded
    pub excluded_tags: Vec<String>,

    /// Modes excluded unless the caller names modes explicitly
    pub excluded_modes: Vec<String>,

    /// Storage sites raw input may be read from
    pub allowed_raw_locations: Vec<String>,

    /// Host of authoritative data records
    pub catalog_authority: String,

    /// Products enabled for this deployment; empty enables every product
    pub enabled_products: Vec<String>,

    /// Per-subsystem processing specs
    pub subsystems: BTreeMap<Detector, SubsystemSpec>,

    /// Processing contexts by name
    pub contexts: BTreeMap<String, ContextSpec>,

    /// Calibration validity windows, by model key then version
    pub calibration_windows: BTreeMap<String, BTreeMap<String, CalibrationWindow>>,

    /// Result cap policy
    pub cap_policy: CapPolicy,

    /// Upload destination per product, with a `default` fallback
    pub upload_destinations: BTreeMap<String, String>,

    /// Products produced but never uploaded
    pub upload_excluded: Vec<String>,
}

impl Default for OutsourceConfig {
    fn default() -> Self {
        let subsystem = |raw: &str, products: &[&str], model: &str| SubsystemSpec {
            raw_type: raw.to_string(),
            to_process: products.iter().map(|p| p.to_string()).collect(),
            calibration_model_key: model.to_string(),
        };

        let mut subsystems = BTreeMap::new();
        subsystems.insert(
            Detector::Tpc,
            subsystem(
                "raw_records",
                &["peaklets", "lone_hits", "merged_s2s", "peak_basics", "event_info"],
                "pmt_gain_tpc",
            ),
        );
        subsystems.insert(
            Detector::NeutronVeto,
            subsystem("raw_records_nv", &["hitlets_nv", "events_nv"], "pmt_gain_nv"),
        );
        subsystems.insert(
            Detector::MuonVeto,
            subsystem("raw_records_mv", &["hitlets_mv", "events_mv"], "pmt_gain_mv"),
        );

        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut upload_destinations = BTreeMap::new();
        for product in ["records", "pulse_counts", "veto_regions"] {
            upload_destinations.insert(product.to_string(), "UC_OSG_USERDISK".to_string());
        }
        for product in ["peaklets", "lone_hits", "merged_s2s", "hitlets_nv"] {
            upload_destinations.insert(product.to_string(), "UC_OSG_USERDISK".to_string());
        }
        upload_destinations.insert(DEFAULT_DESTINATION.to_string(), "UC_MIDWAY_USERDISK".to_string());

        Self {
            min_run_number: RunNumber::new(7157),
            max_run_number: None,
            excluded_tags: strings(&["messy", "bad", "abandon"]),
            excluded_modes: strings(&["pmtgain", "pmtap", "exttrig", "noise", "nVeto_LED_calibration"]),
            allowed_raw_locations: strings(&["UC_OSG_USERDISK", "UC_DALI_USERDISK", "UC_MIDWAY_USERDISK", "SDSC_USERDISK"]),
            catalog_authority: "rucio-catalogue".to_string(),
            enabled_products: Vec::new(),
            subsystems,
            contexts: BTreeMap::new(),
            calibration_windows: BTreeMap::new(),
            cap_policy: CapPolicy::default(),
            upload_destinations,
            upload_excluded: strings(&["records", "records_nv"]),
        }
    }
}

impl OutsourceConfig {
    /// Load configuration.
    ///
    /// With `path == None` the file `default_path` is used when it exists and
    /// the built-in defaults otherwise. An explicitly named file must exist.
    pub async fn load(path: Option<&Path>, default_path: &Path) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (default_path, false),
        };

        let config: Self = match fs::read_to_string(path).await {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                SelectionError::config(format!("invalid config {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                debug!("No config at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(SelectionError::config(format!(
                    "cannot read config {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        config.validate()?;
        info!("Loaded configuration ({} subsystems, {} contexts)", config.subsystems.len(), config.contexts.len());
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.catalog_authority.trim().is_empty() {
            return Err(SelectionError::config("catalog_authority must not be empty"));
        }
        if let Some(max) = self.max_run_number {
            if max < self.min_run_number {
                return Err(SelectionError::config(format!(
                    "max_run_number {} is below min_run_number {}",
                    max.get(),
                    self.min_run_number.get()
                )));
            }
        }
        for (detector, spec) in &self.subsystems {
            if spec.raw_type.trim().is_empty() {
                return Err(SelectionError::config(format!("subsystem {} has no raw_type", detector)));
            }
            if spec.to_process.iter().any(|p| p.trim().is_empty()) {
                return Err(SelectionError::config(format!("subsystem {} lists an empty product name", detector)));
            }
            if spec.calibration_model_key.trim().is_empty() {
                return Err(SelectionError::config(format!("subsystem {} has no calibration_model_key", detector)));
            }
        }
        for (key, versions) in &self.calibration_windows {
            for (version, window) in versions {
                if window.is_empty() {
                    return Err(SelectionError::config(format!(
                        "calibration window {}@{} ends before it starts",
                        key, version
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up a processing context by name.
    pub fn context(&self, name: &str) -> Result<&ContextSpec> {
        self.contexts
            .get(name)
            .ok_or_else(|| SelectionError::config(format!("unknown context '{}'", name)))
    }

    /// Validity window of the calibration model `context` configures for
    /// `spec`, if every link resolves.
    pub fn calibration_window(&self, spec: &SubsystemSpec, context: &ContextSpec) -> Option<CalibrationWindow> {
        let key = &spec.calibration_model_key;
        let version = context.calibration_models.get(key)?;
        self.calibration_windows.get(key)?.get(version).copied()
    }

    /// Whether `product` is enabled for this deployment.
    pub fn is_enabled(&self, product: &str) -> bool {
        self.enabled_products.is_empty() || self.enabled_products.iter().any(|p| p == product)
    }

    /// Where `product` is uploaded, or `None` if it stays local.
    pub fn destination_for(&self, product: &str) -> Option<&str> {
        if self.upload_excluded.iter().any(|p| p == product) {
            return None;
        }
        self.upload_destinations
            .get(product)
            .or_else(|| self.upload_destinations.get(DEFAULT_DESTINATION))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> CalibrationWindow {
        CalibrationWindow::new(
            Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = OutsourceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.subsystems.len(), Detector::ALL.len());
    }

    #[test]
    fn test_calibration_window_resolution() {
        let mut config = OutsourceConfig::default();
        let spec = config.subsystems[&Detector::Tpc].clone();
        let mut context = ContextSpec::default();

        assert!(config.calibration_window(&spec, &context).is_none());

        context.calibration_models.insert("pmt_gain_tpc".into(), "v5".into());
        assert!(config.calibration_window(&spec, &context).is_none());

        config
            .calibration_windows
            .entry("pmt_gain_tpc".into())
            .or_default()
            .insert("v5".into(), window());
        assert_eq!(config.calibration_window(&spec, &context), Some(window()));
    }

    #[test]
    fn test_destination_routing() {
        let config = OutsourceConfig::default();
        assert_eq!(config.destination_for("peaklets"), Some("UC_OSG_USERDISK"));
        assert_eq!(config.destination_for("event_info"), Some("UC_MIDWAY_USERDISK"));
        assert_eq!(config.destination_for("records"), None);
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let mut config = OutsourceConfig::default();
        let w = window();
        config
            .calibration_windows
            .entry("pmt_gain_tpc".into())
            .or_default()
            .insert("v1".into(), CalibrationWindow::new(w.end, w.start));
        assert!(matches!(config.validate(), Err(SelectionError::Configuration(_))));
    }

    #[test]
    fn test_unknown_context() {
        let config = OutsourceConfig::default();
        assert!(matches!(config.context("nope"), Err(SelectionError::Configuration(_))));
    }

    #[test]
    fn test_cap_policy_names_match_config_file() {
        for policy in CapPolicy::value_variants() {
            let name = policy.to_possible_value().unwrap().get_name().to_string();
            assert_eq!(serde_json::to_string(policy).unwrap(), format!("\"{}\"", name));
        }
        assert_eq!(CapPolicy::from_str("per_tier", false).unwrap(), CapPolicy::PerTier);
        assert!(CapPolicy::from_str("sometimes", false).is_err());
    }

    #[tokio::test]
    async fn test_load_partial_file_and_missing_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("outsource.json");

        let config = OutsourceConfig::load(None, &missing).await.unwrap();
        assert_eq!(config, OutsourceConfig::default());

        let err = OutsourceConfig::load(Some(&missing), &missing).await.unwrap_err();
        assert!(matches!(err, SelectionError::Configuration(_)));

        std::fs::write(
            &missing,
            r#"{"min_run_number": 20000, "cap_policy": "per_tier", "contexts": {"online": {"hashes": {"peaklets": "abc"}}}}"#,
        )
        .unwrap();
        let config = OutsourceConfig::load(None, &missing).await.unwrap();
        assert_eq!(config.min_run_number, RunNumber::new(20000));
        assert_eq!(config.cap_policy, CapPolicy::PerTier);
        assert_eq!(config.context("online").unwrap().hashes["peaklets"], "abc");
        assert_eq!(config.catalog_authority, "rucio-catalogue");
    }
}
