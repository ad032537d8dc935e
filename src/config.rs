// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::CaptureSettings;
use crate::compliance::ComplianceSettings;
use crate::drivers::{AcquisitionSettings, Calibration, SerialSettings};

/// Everything device- and site-specific. Missing fields fall back to the
/// reference bench (ADS1115 at gain 2/3, 249K/24k9/2k49/24R9 divider).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub calibration: Calibration,
    pub acquisition: AcquisitionSettings,
    pub compliance: ComplianceSettings,
    pub capture: CaptureSettings,
    pub serial: SerialSettings,
    pub store_path: PathBuf,
    pub recording_path: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            acquisition: AcquisitionSettings::default(),
            compliance: ComplianceSettings::default(),
            capture: CaptureSettings::default(),
            serial: SerialSettings::default(),
            store_path: PathBuf::from("profiles.json"),
            recording_path: None,
        }
    }
}

impl BenchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: BenchConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let acq = &self.acquisition;
        if acq.avg_samples == 0 {
            bail!("acquisition.avg_samples must be at least 1");
        }
        if !(self.calibration.adc_max_sample_points > 0.0) {
            bail!("calibration.adc_max_sample_points must be positive");
        }
        if acq.voltage_adc_floor >= acq.voltage_adc_ceiling {
            bail!(
                "acquisition.voltage_adc_floor ({}) must be below voltage_adc_ceiling ({})",
                acq.voltage_adc_floor,
                acq.voltage_adc_ceiling
            );
        }
        if acq.autorange_floor > acq.voltage_adc_ceiling {
            bail!("acquisition.autorange_floor must not exceed voltage_adc_ceiling");
        }
        if !(self.compliance.stdv_correction >= 0.0) {
            bail!("compliance.stdv_correction must be non-negative");
        }
        if self.serial.baud_rate == 0 {
            bail!("serial.baud_rate must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{ComplianceRule, SampleSet};

    #[test]
    fn defaults_are_valid() {
        BenchConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        fs::write(
            &path,
            r#"{
                "calibration": { "calibration_floor": 0.042 },
                "acquisition": { "autorange_floor": 3000 },
                "compliance": { "rule": "relative_spread", "sample_set": "population_with_new" }
            }"#,
        )
        .unwrap();
        let config = BenchConfig::load(&path).unwrap();
        assert_eq!(config.calibration.calibration_floor, 0.042);
        assert_eq!(config.calibration.v_clamp, 5.8);
        assert_eq!(config.acquisition.autorange_floor, 3000.0);
        assert_eq!(config.acquisition.avg_samples, 10);
        assert_eq!(config.compliance.rule, ComplianceRule::RelativeSpread);
        assert_eq!(config.compliance.sample_set, SampleSet::PopulationWithNew);
        assert_eq!(config.store_path, PathBuf::from("profiles.json"));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = BenchConfig::default();
        config.acquisition.voltage_adc_floor = 31000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_batch() {
        let mut config = BenchConfig::default();
        config.acquisition.avg_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_has_context() {
        let err = BenchConfig::load("/nonexistent/bench.json").unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
