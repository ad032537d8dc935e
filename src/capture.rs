// src/capture.rs
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drivers::{
    AcquisitionError, MeasureError, Measurement, PinSelect, RangeControl, RawAdc,
    ResistanceEngine,
};
use crate::types::{EcuType, Profile};

/// How open/short pins are written into a numeric profile.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub open_circuit_value: f64,
    pub short_circuit_value: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            open_circuit_value: 1.0e9,
            short_circuit_value: 0.0,
        }
    }
}

impl CaptureSettings {
    pub fn profile_value(&self, measurement: &Measurement) -> f64 {
        match measurement {
            Measurement::OpenCircuit { .. } => self.open_circuit_value,
            Measurement::ShortCircuit { .. } => self.short_circuit_value,
            Measurement::Resistance { .. } => measurement.scaled_value().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("could not route pin {pin}: {source}")]
    Select {
        pin: usize,
        #[source]
        source: AcquisitionError,
    },
    #[error("pin {pin}: {source}")]
    Measure {
        pin: usize,
        #[source]
        source: MeasureError,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PinMeasurement {
    pub pin: usize,
    pub measurement: Measurement,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CapturedProfile {
    pub profile: Profile,
    pub readings: Vec<PinMeasurement>,
}

/// Walks every pin of an ECU through the autorange engine, in pin order.
pub struct ProfileCapture<B> {
    engine: ResistanceEngine<B>,
    settings: CaptureSettings,
}

impl<B: RawAdc + RangeControl + PinSelect> ProfileCapture<B> {
    pub fn new(engine: ResistanceEngine<B>, settings: CaptureSettings) -> Self {
        Self { engine, settings }
    }

    pub fn into_engine(self) -> ResistanceEngine<B> {
        self.engine
    }

    pub fn measure(&mut self, pin: usize) -> Result<Measurement, CaptureError> {
        self.engine
            .bench_mut()
            .select_pin(pin)
            .map_err(|source| CaptureError::Select { pin, source })?;
        self.engine
            .measure_pin()
            .map_err(|source| CaptureError::Measure { pin, source })
    }

    pub fn capture(&mut self, ecu: &EcuType) -> Result<CapturedProfile, CaptureError> {
        info!("capturing {} pins of {}", ecu.pin_count, ecu.name);
        let mut values = Vec::with_capacity(ecu.pin_count);
        let mut readings = Vec::with_capacity(ecu.pin_count);
        for pin in 0..ecu.pin_count {
            let measurement = self.measure(pin)?;
            let value = self.settings.profile_value(&measurement);
            debug!("pin {pin}: {measurement:?} -> {value}");
            values.push(value);
            readings.push(PinMeasurement { pin, measurement });
        }
        Ok(CapturedProfile {
            profile: Profile::new(values),
            readings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{AcquisitionSettings, Calibration, Range, ScriptedBench};

    fn capture(bench: ScriptedBench) -> ProfileCapture<ScriptedBench> {
        let engine =
            ResistanceEngine::new(bench, Calibration::default(), AcquisitionSettings::default());
        ProfileCapture::new(engine, CaptureSettings::default())
    }

    #[test]
    fn builds_profile_in_pin_order() {
        let bench = ScriptedBench::new()
            .with_range(Range::R100K, 100)
            .with_range(Range::R10K, 100)
            .with_range(Range::R1K, 100)
            .with_range(Range::R0, 100)
            .with_pin(0, Range::R100K, 31000)
            .with_pin(1, Range::R1K, 15430);
        let mut capture = capture(bench);
        let ecu = EcuType {
            name: "EDC15".into(),
            pin_count: 3,
        };
        let captured = capture.capture(&ecu).unwrap();

        let cal = Calibration::default();
        assert_eq!(
            captured.profile.values,
            vec![1.0e9, cal.convert(15430.0) * 1_000.0, 0.0]
        );
        assert_eq!(captured.readings.len(), 3);
        assert!(matches!(
            captured.readings[2].measurement,
            Measurement::ShortCircuit { .. }
        ));
        let engine = capture.into_engine();
        assert_eq!(engine.into_bench().pin_log(), &[0, 1, 2]);
    }

    #[test]
    fn exhausted_pin_aborts_capture() {
        let bench = Range::ALL
            .into_iter()
            .fold(ScriptedBench::constant(20000), |b, r| b.with_pin(1, r, 1000));
        let ecu = EcuType {
            name: "ME9".into(),
            pin_count: 4,
        };
        match capture(bench).capture(&ecu) {
            Err(CaptureError::Measure {
                pin: 1,
                source: MeasureError::AutorangeExhausted { .. },
            }) => {}
            other => panic!("expected exhaustion on pin 1, got {other:?}"),
        }
    }
}
