use thiserror::Error;
use crate::drivers::range::Range;
/// Failure of a single raw conversion or capability command.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("bus error: {0}")]
    Bus(String),
    #[error("raw read timed out")]
    Timeout,
    #[error("unexpected reply from bench: {0:?}")]
    Protocol(String),
    #[error("all {attempts} raw reads in the batch failed")]
    BatchFailed { attempts: usize },
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
/// Outcome of a failed `measure_pin()` cycle.
#[derive(Debug, Error)]
pub enum MeasureError {
    #[error("acquisition failed at range {range}: {source}")]
    Acquisition {
        range: Range,
        #[source]
        source: AcquisitionError,
    },
    #[error("autorange exhausted all ranges, last averaged reading {last_reading:.1}")]
    AutorangeExhausted { last_reading: f64 },
}
