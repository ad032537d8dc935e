use std::collections::{HashMap, VecDeque};
use crate::drivers::error::AcquisitionError;
use crate::drivers::range::Range;
/// One raw ADC conversion, in counts.
pub type RawSample = u16;
/// Something that can perform a single raw conversion at the current gain.
pub trait RawAdc {
    fn read(&mut self) -> Result<RawSample, AcquisitionError>;
}
/// Drives the 2-bit range mux. Must have settled before it returns.
pub trait RangeControl {
    fn set(&mut self, range: Range) -> Result<(), AcquisitionError>;
}
/// Routes one connector pin of the unit under test to the measurement input.
pub trait PinSelect {
    fn select_pin(&mut self, pin: usize) -> Result<(), AcquisitionError>;
}
impl<T: RawAdc + ?Sized> RawAdc for &mut T {
    fn read(&mut self) -> Result<RawSample, AcquisitionError> {
        (**self).read()
    }
}
impl<T: RangeControl + ?Sized> RangeControl for &mut T {
    fn set(&mut self, range: Range) -> Result<(), AcquisitionError> {
        (**self).set(range)
    }
}
impl<T: PinSelect + ?Sized> PinSelect for &mut T {
    fn select_pin(&mut self, pin: usize) -> Result<(), AcquisitionError> {
        (**self).select_pin(pin)
    }
}
/// In-memory bench useful for tests and deterministic playback.
///
/// Readings are resolved in this order: queued reads for the active range
/// (`None` entries fail with a bus error), a constant for the active pin and
/// range, a constant for the active range, then the bench-wide default.
#[derive(Debug, Default)]
pub struct ScriptedBench {
    active_range: Option<Range>,
    active_pin: usize,
    queued: HashMap<Range, VecDeque<Option<RawSample>>>,
    pin_constants: HashMap<(usize, Range), RawSample>,
    range_constants: HashMap<Range, RawSample>,
    default: Option<RawSample>,
    range_log: Vec<Range>,
    pin_log: Vec<usize>,
    reads: usize,
}
impl ScriptedBench {
    pub fn new() -> Self {
        Self::default()
    }
    /// Same count at every pin and range.
    pub fn constant(value: RawSample) -> Self {
        Self {
            default: Some(value),
            ..Self::default()
        }
    }
    pub fn with_range(mut self, range: Range, value: RawSample) -> Self {
        self.range_constants.insert(range, value);
        self
    }
    pub fn with_pin(mut self, pin: usize, range: Range, value: RawSample) -> Self {
        self.pin_constants.insert((pin, range), value);
        self
    }
    pub fn with_queue(
        mut self,
        range: Range,
        reads: impl IntoIterator<Item = Option<RawSample>>,
    ) -> Self {
        self.queued.entry(range).or_default().extend(reads);
        self
    }
    /// Every range the mux was commanded to, in order.
    pub fn range_log(&self) -> &[Range] {
        &self.range_log
    }
    pub fn pin_log(&self) -> &[usize] {
        &self.pin_log
    }
    pub fn active_range(&self) -> Option<Range> {
        self.active_range
    }
    /// Number of raw conversions attempted, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads
    }
}
impl RawAdc for ScriptedBench {
    fn read(&mut self) -> Result<RawSample, AcquisitionError> {
        self.reads += 1;
        let range = self
            .active_range
            .ok_or_else(|| AcquisitionError::Bus("range mux never set".into()))?;
        if let Some(next) = self.queued.get_mut(&range).and_then(|q| q.pop_front()) {
            return next.ok_or_else(|| AcquisitionError::Bus("scripted read failure".into()));
        }
        self.pin_constants
            .get(&(self.active_pin, range))
            .or_else(|| self.range_constants.get(&range))
            .copied()
            .or(self.default)
            .ok_or_else(|| AcquisitionError::Bus(format!("no scripted reading for {range}")))
    }
}
impl RangeControl for ScriptedBench {
    fn set(&mut self, range: Range) -> Result<(), AcquisitionError> {
        self.active_range = Some(range);
        self.range_log.push(range);
        Ok(())
    }
}
impl PinSelect for ScriptedBench {
    fn select_pin(&mut self, pin: usize) -> Result<(), AcquisitionError> {
        self.active_pin = pin;
        self.pin_log.push(pin);
        Ok(())
    }
}
