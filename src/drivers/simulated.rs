use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::drivers::error::AcquisitionError;
use crate::drivers::range::Range;
use crate::drivers::source::{PinSelect, RangeControl, RawAdc, RawSample};
/// Virtual divider bench for running without hardware.
///
/// Each pin carries a load resistance (`f64::INFINITY` for an unconnected pin).
/// A conversion returns `full_scale * R / (R + R_div)` plus uniform noise.
pub struct SimulatedBench {
    loads_ohms: Vec<f64>,
    active_pin: usize,
    active_range: Range,
    full_scale: f64,
    noise_counts: f64,
    failure_rate: f64,
    rng: StdRng,
}
impl SimulatedBench {
    pub fn new(loads_ohms: Vec<f64>, full_scale: f64) -> Self {
        Self {
            loads_ohms,
            active_pin: 0,
            active_range: Range::HIGHEST,
            full_scale,
            noise_counts: 0.0,
            failure_rate: 0.0,
            rng: StdRng::from_entropy(),
        }
    }
    /// Loads drawn uniformly from `min_ohms..max_ohms`, one per pin. The same
    /// `load_seed` always wires the same loads, so repeated runs look like one unit type.
    pub fn random(
        pin_count: usize,
        min_ohms: f64,
        max_ohms: f64,
        full_scale: f64,
        load_seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(load_seed);
        let loads = (0..pin_count)
            .map(|_| rng.gen_range(min_ohms..max_ohms))
            .collect();
        Self::new(loads, full_scale)
    }
    pub fn with_noise(mut self, noise_counts: f64) -> Self {
        self.noise_counts = noise_counts.abs();
        self
    }
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
    pub fn pin_count(&self) -> usize {
        self.loads_ohms.len()
    }
    fn ideal_counts(&self) -> f64 {
        let load = self.loads_ohms.get(self.active_pin).copied().unwrap_or(f64::INFINITY);
        if load.is_infinite() {
            return self.full_scale;
        }
        let divider = self.active_range.divider_ohms();
        self.full_scale * load / (load + divider)
    }
}
impl RawAdc for SimulatedBench {
    fn read(&mut self) -> Result<RawSample, AcquisitionError> {
        if self.failure_rate > 0.0 && self.rng.gen_bool(self.failure_rate) {
            return Err(AcquisitionError::Bus("simulated i2c error".into()));
        }
        let noise = if self.noise_counts > 0.0 {
            self.rng.gen_range(-self.noise_counts..=self.noise_counts)
        } else {
            0.0
        };
        let counts = (self.ideal_counts() + noise).round();
        Ok(counts.clamp(0.0, f64::from(RawSample::MAX)) as RawSample)
    }
}
impl RangeControl for SimulatedBench {
    fn set(&mut self, range: Range) -> Result<(), AcquisitionError> {
        self.active_range = range;
        Ok(())
    }
}
impl PinSelect for SimulatedBench {
    fn select_pin(&mut self, pin: usize) -> Result<(), AcquisitionError> {
        if pin >= self.loads_ohms.len() {
            return Err(AcquisitionError::Bus(format!(
                "pin {pin} not wired (bench has {})",
                self.loads_ohms.len()
            )));
        }
        self.active_pin = pin;
        Ok(())
    }
}
