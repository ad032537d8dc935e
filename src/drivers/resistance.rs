//! Auto-ranging resistance measurement through the 4-channel divider.
//!
//! One cycle:
//! - Park the mux on the highest-impedance range.
//! - Sweep `R100K -> R10K -> R1K -> R0`, taking a fresh averaged reading at each
//!   range, until the mean reaches the autorange floor.
//! - Classify the settled reading: pinned near full scale on `R100K` is an open
//!   circuit, pinned near zero on `R0` is a short, anything else is converted:
//!   `value = raw * (v_clamp / adc_max_sample_points) - calibration_floor`.
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use crate::drivers::error::MeasureError;
use crate::drivers::range::{Range, RangeDecision, RangeSelector};
use crate::drivers::sampler::{AveragedReading, Sampler, ADC_AVG_SAMPLES};
use crate::drivers::source::{RangeControl, RawAdc};
/// Maximum voltage clamped at the ADC input (volts).
pub const ADC_VOLTAGE_CLAMP: f64 = 5.8;
/// Full-scale count at the reference gain setting.
pub const ADC_MAX_SAMPLE_POINTS: f64 = 30860.0;
/// Zero offset subtracted after scaling.
pub const ADC_CALIBRATION_FLOOR: f64 = 0.062;
/// Mean count a range must reach before the sweep settles on it.
pub const ADC_AUTORANGE_FLOOR: f64 = 6000.0;
/// Below this on the lowest range the load is a short.
pub const VOLTAGE_ADC_FLOOR: f64 = 400.0;
/// Above this on the highest range the load is open.
pub const VOLTAGE_ADC_CEILING: f64 = 30400.0;
/// Linear raw-count to value conversion constants for one device.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub v_clamp: f64,
    pub adc_max_sample_points: f64,
    pub calibration_floor: f64,
}
impl Default for Calibration {
    fn default() -> Self {
        Self {
            v_clamp: ADC_VOLTAGE_CLAMP,
            adc_max_sample_points: ADC_MAX_SAMPLE_POINTS,
            calibration_floor: ADC_CALIBRATION_FLOOR,
        }
    }
}
impl Calibration {
    /// `raw * (v_clamp / adc_max_sample_points) - calibration_floor`
    pub fn convert(&self, raw: f64) -> f64 {
        raw * (self.v_clamp / self.adc_max_sample_points) - self.calibration_floor
    }
}
/// Thresholds and batch settings for the sweep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub avg_samples: usize,
    pub read_retries: usize,
    pub autorange_floor: f64,
    pub voltage_adc_floor: f64,
    pub voltage_adc_ceiling: f64,
    /// Return the mux to the highest range once a cycle is over.
    pub park_after_measure: bool,
}
impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            avg_samples: ADC_AVG_SAMPLES,
            read_retries: 0,
            autorange_floor: ADC_AUTORANGE_FLOOR,
            voltage_adc_floor: VOLTAGE_ADC_FLOOR,
            voltage_adc_ceiling: VOLTAGE_ADC_CEILING,
            park_after_measure: true,
        }
    }
}
/// Final result of one acquisition cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    Resistance { value: f64, range: Range, raw: f64 },
    OpenCircuit { raw: f64 },
    ShortCircuit { raw: f64 },
}
impl Measurement {
    /// Averaged count the classification was made from.
    pub fn raw(&self) -> f64 {
        match *self {
            Measurement::Resistance { raw, .. }
            | Measurement::OpenCircuit { raw }
            | Measurement::ShortCircuit { raw } => raw,
        }
    }
    pub fn range(&self) -> Range {
        match *self {
            Measurement::Resistance { range, .. } => range,
            Measurement::OpenCircuit { .. } => Range::HIGHEST,
            Measurement::ShortCircuit { .. } => Range::LOWEST,
        }
    }
    /// Calibrated value times the range multiplier. This is the number stored in a
    /// profile, not `value` itself (which is read against the range label).
    /// `None` for open/short.
    pub fn scaled_value(&self) -> Option<f64> {
        match *self {
            Measurement::Resistance { value, range, .. } => Some(value * range.multiplier()),
            _ => None,
        }
    }
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Measurement::Resistance { .. } => "resistance",
            Measurement::OpenCircuit { .. } => "open",
            Measurement::ShortCircuit { .. } => "short",
        }
    }
}
/// Runs the auto-range sweep against an exclusively borrowed bench.
pub struct ResistanceEngine<B> {
    bench: B,
    selector: RangeSelector,
    calibration: Calibration,
    settings: AcquisitionSettings,
}
impl<B: RawAdc + RangeControl> ResistanceEngine<B> {
    pub fn new(bench: B, calibration: Calibration, settings: AcquisitionSettings) -> Self {
        Self {
            bench,
            selector: RangeSelector::new(settings.autorange_floor),
            calibration,
            settings,
        }
    }
    pub fn bench_mut(&mut self) -> &mut B {
        &mut self.bench
    }
    pub fn into_bench(self) -> B {
        self.bench
    }
    pub fn measure_pin(&mut self) -> Result<Measurement, MeasureError> {
        self.reset_range()?;
        let result = self
            .sweep()
            .and_then(|reading| self.classify(reading));
        if self.settings.park_after_measure {
            // Keep the sweep's own error if both fail.
            if let Err(err) = self.reset_range() {
                if result.is_ok() {
                    return Err(err);
                }
            }
        }
        result
    }
    fn reset_range(&mut self) -> Result<(), MeasureError> {
        self.set_range(Range::HIGHEST)?;
        debug!("ADC range mux reset to {}", Range::HIGHEST);
        Ok(())
    }
    fn set_range(&mut self, range: Range) -> Result<(), MeasureError> {
        self.bench
            .set(range)
            .map_err(|source| MeasureError::Acquisition { range, source })
    }
    fn sweep(&mut self) -> Result<AveragedReading, MeasureError> {
        let mut range = Range::HIGHEST;
        loop {
            self.set_range(range)?;
            debug!("ADC range mux channel set to {range}");
            let reading = Sampler::new(&mut self.bench, self.settings.avg_samples)
                .with_retries(self.settings.read_retries)
                .read_averaged(range)
                .map_err(|source| MeasureError::Acquisition { range, source })?;
            match self.selector.decide(range, reading.mean) {
                RangeDecision::Settle => return Ok(reading),
                RangeDecision::Advance(next) => range = next,
                // The last range still gets classified; a short sits below the floor.
                RangeDecision::Exhausted => return Ok(reading),
            }
        }
    }
    fn classify(&self, reading: AveragedReading) -> Result<Measurement, MeasureError> {
        let raw = reading.mean;
        if raw > self.settings.voltage_adc_ceiling && reading.range.is_highest() {
            info!("open circuit (raw {raw:.1} at {})", reading.range);
            return Ok(Measurement::OpenCircuit { raw });
        }
        if raw < self.settings.voltage_adc_floor && reading.range.is_lowest() {
            info!("short circuit (raw {raw:.1} at {})", reading.range);
            return Ok(Measurement::ShortCircuit { raw });
        }
        if raw < self.selector.autorange_floor() {
            warn!("autorange failed, last reading {raw:.1} at {}", reading.range);
            return Err(MeasureError::AutorangeExhausted { last_reading: raw });
        }
        let value = self.calibration.convert(raw);
        debug!("ADCSAMPLE {raw:.1} -> {value:.4} {}", reading.range);
        Ok(Measurement::Resistance {
            value,
            range: reading.range,
            raw,
        })
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::ScriptedBench;
    fn engine(bench: ScriptedBench) -> ResistanceEngine<ScriptedBench> {
        ResistanceEngine::new(bench, Calibration::default(), AcquisitionSettings::default())
    }
    #[test]
    fn conversion_matches_linear_calibration_exactly() {
        let cal = Calibration::default();
        let expected = 15430.0 * (5.8 / 30860.0) - 0.062;
        assert_eq!(cal.convert(15430.0), expected);
        assert!((cal.convert(15430.0) - (2.9 - 0.062)).abs() < 1e-12);
    }
    #[test]
    fn settles_on_first_range_reaching_floor() {
        let bench = ScriptedBench::new()
            .with_range(Range::R100K, 100)
            .with_range(Range::R10K, 2000)
            .with_range(Range::R1K, 15430)
            .with_range(Range::R0, 30000);
        let mut engine = engine(bench);
        let m = engine.measure_pin().unwrap();
        assert_eq!(
            m,
            Measurement::Resistance {
                value: Calibration::default().convert(15430.0),
                range: Range::R1K,
                raw: 15430.0,
            }
        );
        // reset, sweep R100K/R10K/R1K, park
        assert_eq!(
            engine.into_bench().range_log(),
            &[Range::R100K, Range::R100K, Range::R10K, Range::R1K, Range::R100K]
        );
    }
    #[test]
    fn resets_to_highest_range_before_every_cycle() {
        let settings = AcquisitionSettings {
            park_after_measure: false,
            ..AcquisitionSettings::default()
        };
        let mut engine = ResistanceEngine::new(
            ScriptedBench::new()
                .with_range(Range::R100K, 10)
                .with_range(Range::R10K, 10)
                .with_range(Range::R1K, 10)
                .with_range(Range::R0, 9000),
            Calibration::default(),
            settings,
        );
        engine.measure_pin().unwrap();
        assert_eq!(engine.bench_mut().active_range(), Some(Range::R0));
        engine.measure_pin().unwrap();
        let log = engine.into_bench().range_log().to_vec();
        assert_eq!(log[0], Range::R100K);
        assert_eq!(log[5], Range::R100K);
        assert_eq!(log.len(), 10);
    }
    #[test]
    fn open_circuit_above_ceiling_on_highest_range() {
        let ceiling = VOLTAGE_ADC_CEILING as u16;
        let mut engine = engine(ScriptedBench::constant(ceiling + 1));
        assert_eq!(
            engine.measure_pin().unwrap(),
            Measurement::OpenCircuit {
                raw: f64::from(ceiling + 1)
            }
        );
    }
    #[test]
    fn short_circuit_below_floor_on_lowest_range() {
        let floor = VOLTAGE_ADC_FLOOR as u16;
        let mut engine = engine(ScriptedBench::constant(floor - 1));
        assert_eq!(
            engine.measure_pin().unwrap(),
            Measurement::ShortCircuit {
                raw: f64::from(floor - 1)
            }
        );
        let log = engine.into_bench().range_log().to_vec();
        assert!(log.contains(&Range::R0));
    }
    #[test]
    fn exhausted_when_lowest_range_stays_under_autorange_floor() {
        let mut engine = engine(ScriptedBench::constant(1000));
        match engine.measure_pin() {
            Err(MeasureError::AutorangeExhausted { last_reading }) => {
                assert_eq!(last_reading, 1000.0)
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        let log = engine.into_bench().range_log().to_vec();
        assert_eq!(
            &log[1..5],
            &[Range::R100K, Range::R10K, Range::R1K, Range::R0]
        );
    }
    #[test]
    fn below_floor_at_high_range_but_fine_at_r0_is_not_exhausted() {
        let bench = ScriptedBench::constant(100).with_range(Range::R0, 7000);
        let m = engine(bench).measure_pin().unwrap();
        assert_eq!(m.range(), Range::R0);
        assert_eq!(m.scaled_value(), Some(Calibration::default().convert(7000.0)));
    }
    #[test]
    fn full_scale_on_lower_range_is_a_measurement() {
        let bench = ScriptedBench::constant(100).with_range(Range::R10K, 30500);
        let m = engine(bench).measure_pin().unwrap();
        assert!(matches!(m, Measurement::Resistance { range: Range::R10K, .. }));
    }
    #[test]
    fn failed_batch_reports_range() {
        let bench = ScriptedBench::new()
            .with_range(Range::R100K, 10)
            .with_queue(Range::R10K, vec![None; ADC_AVG_SAMPLES]);
        match engine(bench).measure_pin() {
            Err(MeasureError::Acquisition { range, .. }) => assert_eq!(range, Range::R10K),
            other => panic!("expected acquisition error, got {other:?}"),
        }
    }
    #[test]
    fn scaled_value_applies_range_multiplier() {
        let m = Measurement::Resistance {
            value: 2.5,
            range: Range::R10K,
            raw: 0.0,
        };
        assert_eq!(m.scaled_value(), Some(25_000.0));
        assert_eq!(Measurement::OpenCircuit { raw: 31000.0 }.scaled_value(), None);
    }
}
