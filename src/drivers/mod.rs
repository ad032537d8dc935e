// src/drivers/mod.rs
// Acquisition core: range mux, raw ADC capabilities, averaging and the autorange engine.
pub mod error;
pub mod range;
pub mod resistance;
pub mod sampler;
pub mod serial;
pub mod simulated;
pub mod source;
pub use error::{AcquisitionError, MeasureError};
pub use range::{Range, RangeDecision, RangeSelector};
pub use resistance::{AcquisitionSettings, Calibration, Measurement, ResistanceEngine};
pub use sampler::{AveragedReading, Sampler, ADC_AVG_SAMPLES};
pub use serial::{SerialBench, SerialSettings};
pub use simulated::SimulatedBench;
pub use source::{PinSelect, RangeControl, RawAdc, RawSample, ScriptedBench};
