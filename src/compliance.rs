//! Population-based compliance check for captured pin profiles.
//!
//! Per pin, the mean and population standard deviation (ddof = 0) are taken over
//! the known-good profiles (optionally with the new profile folded in), then one of
//! two decision rules is applied:
//!
//! - `Outlier`: the new value must lie within `mean ± k·stdev`. Only failing pins
//!   are reported.
//! - `RelativeSpread`: the coefficient of variation `stdev / mean · 100` must not
//!   exceed `k`. When any pin fails, every pin is reported with its status.
//!
//! Division by a zero mean or a zero spread never yields NaN: the pin is marked
//! with a [`Degeneracy`] instead.
use std::fmt;

use log::{debug, info};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EcuType, Profile};

/// Default `k` for both rules (standard deviations, or percent spread).
pub const STDV_CORRECTION: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceRule {
    Outlier,
    RelativeSpread,
}

/// Which profiles the per-pin statistics are computed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSet {
    PopulationOnly,
    /// Fold the new profile into the statistics; allows an empty population.
    PopulationWithNew,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceSettings {
    pub rule: ComplianceRule,
    pub stdv_correction: f64,
    pub sample_set: SampleSet,
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            rule: ComplianceRule::Outlier,
            stdv_correction: STDV_CORRECTION,
            sample_set: SampleSet::PopulationOnly,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinStatus {
    Ok,
    Defect,
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinStatus::Ok => f.pad("OK"),
            PinStatus::Defect => f.pad("DEFECT"),
        }
    }
}

/// Why a pin's statistics could not be used as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Degeneracy {
    ZeroMean,
    ZeroSpread,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinRecord {
    pub status: PinStatus,
    pub pin: usize,
    pub mean: f64,
    pub stdev: f64,
    pub observed: f64,
    pub deviation_percent: Option<f64>,
    pub degeneracy: Option<Degeneracy>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ComplianceVerdict {
    Compliant,
    /// Ordered by pin index.
    Findings(Vec<PinRecord>),
}

impl ComplianceVerdict {
    pub fn is_compliant(&self) -> bool {
        matches!(self, ComplianceVerdict::Compliant)
    }

    pub fn defects(&self) -> impl Iterator<Item = &PinRecord> {
        let records: &[PinRecord] = match self {
            ComplianceVerdict::Compliant => &[],
            ComplianceVerdict::Findings(records) => records,
        };
        records.iter().filter(|r| r.status == PinStatus::Defect)
    }
}

/// Identifies the offending profile in an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileMember {
    New,
    Population(usize),
}

impl fmt::Display for ProfileMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileMember::New => f.write_str("new profile"),
            ProfileMember::Population(idx) => write!(f, "population member {idx}"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ComplianceError {
    #[error("shape mismatch: {member} has {actual} pins, expected {expected}")]
    ShapeMismatch {
        member: ProfileMember,
        expected: usize,
        actual: usize,
    },
    #[error("population is empty and the new profile is not part of the sample set")]
    EmptyPopulation,
    #[error("{member} has a non-finite value at pin {pin}")]
    NonFiniteValue { member: ProfileMember, pin: usize },
}

/// Pure function of its inputs; holds only the decision settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComplianceAnalyzer {
    settings: ComplianceSettings,
}

impl ComplianceAnalyzer {
    pub fn new(settings: ComplianceSettings) -> Self {
        Self { settings }
    }

    /// Like [`evaluate`](Self::evaluate), but also checks the new profile against
    /// the ECU's declared pin count.
    pub fn evaluate_for(
        &self,
        ecu: &EcuType,
        new_profile: &Profile,
        population: &[Profile],
    ) -> Result<ComplianceVerdict, ComplianceError> {
        if new_profile.pin_count() != ecu.pin_count {
            return Err(ComplianceError::ShapeMismatch {
                member: ProfileMember::New,
                expected: ecu.pin_count,
                actual: new_profile.pin_count(),
            });
        }
        self.evaluate(new_profile, population)
    }

    pub fn evaluate(
        &self,
        new_profile: &Profile,
        population: &[Profile],
    ) -> Result<ComplianceVerdict, ComplianceError> {
        let pins = new_profile.pin_count();
        check_finite(ProfileMember::New, new_profile)?;
        for (idx, member) in population.iter().enumerate() {
            let member_id = ProfileMember::Population(idx);
            if member.pin_count() != pins {
                return Err(ComplianceError::ShapeMismatch {
                    member: member_id,
                    expected: pins,
                    actual: member.pin_count(),
                });
            }
            check_finite(member_id, member)?;
        }

        let mut samples: Vec<&Profile> = population.iter().collect();
        if self.settings.sample_set == SampleSet::PopulationWithNew {
            samples.push(new_profile);
        }
        if samples.is_empty() {
            return Err(ComplianceError::EmptyPopulation);
        }

        let (means, stdevs) = pin_statistics(&samples, pins);
        debug!(
            "compliance over {} profiles x {} pins ({:?})",
            samples.len(),
            pins,
            self.settings.rule
        );

        let k = self.settings.stdv_correction;
        let records: Vec<PinRecord> = (0..pins)
            .map(|pin| {
                let (mean, stdev, observed) = (means[pin], stdevs[pin], new_profile.values[pin]);
                match self.settings.rule {
                    ComplianceRule::Outlier => outlier_record(pin, mean, stdev, observed, k),
                    ComplianceRule::RelativeSpread => {
                        relative_spread_record(pin, mean, stdev, observed, k)
                    }
                }
            })
            .collect();

        let flagged: Vec<&PinRecord> = records
            .iter()
            .filter(|r| r.status == PinStatus::Defect)
            .collect();
        if flagged.is_empty() {
            return Ok(ComplianceVerdict::Compliant);
        }
        for record in &flagged {
            info!(
                "DEFECT pin {}: observed {:.4}, mean {:.4}, stdev {:.4}",
                record.pin, record.observed, record.mean, record.stdev
            );
        }

        let findings = match self.settings.rule {
            ComplianceRule::Outlier => records
                .into_iter()
                .filter(|r| r.status == PinStatus::Defect)
                .collect(),
            ComplianceRule::RelativeSpread => records,
        };
        Ok(ComplianceVerdict::Findings(findings))
    }
}

fn check_finite(member: ProfileMember, profile: &Profile) -> Result<(), ComplianceError> {
    match profile.values.iter().position(|v| !v.is_finite()) {
        Some(pin) => Err(ComplianceError::NonFiniteValue { member, pin }),
        None => Ok(()),
    }
}

/// Per-pin mean and population stdev. Columns are sorted before reduction so the
/// result does not depend on the order profiles were stored in.
///
/// The mean is accumulated as offsets from the smallest value and the spread is
/// taken around that same mean, so a column of identical values reduces to exactly
/// that value with zero spread.
fn pin_statistics(samples: &[&Profile], pins: usize) -> (Vec<f64>, Vec<f64>) {
    let columns: Vec<Vec<f64>> = (0..pins)
        .map(|pin| {
            let mut column: Vec<f64> = samples.iter().map(|p| p.values[pin]).collect();
            column.sort_by(f64::total_cmp);
            column
        })
        .collect();
    // pins x samples
    let matrix = Array2::from_shape_fn((pins, samples.len()), |(pin, row)| columns[pin][row]);
    matrix
        .axis_iter(Axis(0))
        .map(|column| {
            let first = column.get(0).copied().unwrap_or_default();
            let mean = first + column.mapv(|x| x - first).mean().unwrap_or_default();
            let variance = column
                .mapv(|x| (x - mean).powi(2))
                .mean()
                .unwrap_or_default();
            (mean, variance.sqrt())
        })
        .unzip()
}

fn outlier_record(pin: usize, mean: f64, stdev: f64, observed: f64, k: f64) -> PinRecord {
    let out_of_band = (observed - mean).abs() > k * stdev;
    let deviation_percent = (mean != 0.0).then(|| (observed - mean) / mean * 100.0);
    let degeneracy = if !out_of_band {
        None
    } else if stdev == 0.0 {
        Some(Degeneracy::ZeroSpread)
    } else if mean == 0.0 {
        Some(Degeneracy::ZeroMean)
    } else {
        None
    };
    PinRecord {
        status: if out_of_band {
            PinStatus::Defect
        } else {
            PinStatus::Ok
        },
        pin,
        mean,
        stdev,
        observed,
        deviation_percent,
        degeneracy,
    }
}

fn relative_spread_record(pin: usize, mean: f64, stdev: f64, observed: f64, k: f64) -> PinRecord {
    if mean == 0.0 {
        return PinRecord {
            status: PinStatus::Defect,
            pin,
            mean,
            stdev,
            observed,
            deviation_percent: None,
            degeneracy: Some(Degeneracy::ZeroMean),
        };
    }
    let spread = stdev / mean.abs() * 100.0;
    PinRecord {
        status: if spread > k {
            PinStatus::Defect
        } else {
            PinStatus::Ok
        },
        pin,
        mean,
        stdev,
        observed,
        deviation_percent: Some(spread),
        degeneracy: None,
    }
}
