use log::{debug, warn};
use crate::drivers::error::AcquisitionError;
use crate::drivers::range::Range;
use crate::drivers::source::RawAdc;
/// Reference batch size for one averaged reading.
pub const ADC_AVG_SAMPLES: usize = 10;
/// Mean of one batch of raw conversions taken at a single range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AveragedReading {
    pub range: Range,
    pub mean: f64,
    /// Raw reads that made it into the mean.
    pub used: usize,
    /// Raw reads excluded because they failed.
    pub failed: usize,
}
/// Reduces a fixed number of raw reads to their arithmetic mean.
///
/// Failed reads are left out of the mean instead of being counted as zero.
/// Each slot may be retried a bounded number of times before it is given up.
pub struct Sampler<A: RawAdc> {
    adc: A,
    avg_samples: usize,
    read_retries: usize,
}
impl<A: RawAdc> Sampler<A> {
    pub fn new(adc: A, avg_samples: usize) -> Self {
        Self {
            adc,
            avg_samples,
            read_retries: 0,
        }
    }
    pub fn with_retries(mut self, read_retries: usize) -> Self {
        self.read_retries = read_retries;
        self
    }
    pub fn into_inner(self) -> A {
        self.adc
    }
    pub fn read_averaged(&mut self, range: Range) -> Result<AveragedReading, AcquisitionError> {
        let mut sum = 0.0f64;
        let mut used = 0usize;
        let mut last_err = None;
        for slot in 0..self.avg_samples {
            match self.read_slot() {
                Ok(sample) => {
                    sum += f64::from(sample);
                    used += 1;
                }
                Err(err) => {
                    warn!("raw read {slot} at {range} excluded from average: {err}");
                    last_err = Some(err);
                }
            }
        }
        if used == 0 {
            // A batch of one keeps the underlying cause; larger batches report the count.
            return Err(match (self.avg_samples, last_err) {
                (1, Some(err)) => err,
                _ => AcquisitionError::BatchFailed {
                    attempts: self.avg_samples,
                },
            });
        }
        let reading = AveragedReading {
            range,
            mean: sum / used as f64,
            used,
            failed: self.avg_samples - used,
        };
        debug!(
            "ADC AVG READING {:.1} at {} ({} of {} reads)",
            reading.mean, range, used, self.avg_samples
        );
        Ok(reading)
    }
    fn read_slot(&mut self) -> Result<u16, AcquisitionError> {
        let mut attempt = 0;
        loop {
            match self.adc.read() {
                Ok(sample) => return Ok(sample),
                Err(err) if attempt < self.read_retries => {
                    debug!("raw read failed ({err}), retry {}", attempt + 1);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::{RangeControl, ScriptedBench};
    fn bench_at(range: Range, reads: Vec<Option<u16>>) -> ScriptedBench {
        let mut bench = ScriptedBench::new().with_queue(range, reads);
        bench.set(range).unwrap();
        bench
    }
    #[test]
    fn mean_of_full_batch() {
        let reads = (1..=10).map(|v| Some(v * 100)).collect();
        let mut sampler = Sampler::new(bench_at(Range::R10K, reads), ADC_AVG_SAMPLES);
        let reading = sampler.read_averaged(Range::R10K).unwrap();
        assert_eq!(reading.mean, 550.0);
        assert_eq!(reading.used, 10);
        assert_eq!(reading.failed, 0);
        assert_eq!(reading.range, Range::R10K);
    }
    #[test]
    fn failed_reads_are_excluded_not_zeroed() {
        let mut reads = vec![Some(1000u16); 10];
        reads[2] = None;
        reads[7] = None;
        let mut sampler = Sampler::new(bench_at(Range::R1K, reads), ADC_AVG_SAMPLES);
        let reading = sampler.read_averaged(Range::R1K).unwrap();
        // Zero-filling the two failed slots would give 800.
        assert_eq!(reading.mean, 1000.0);
        assert_eq!(reading.used, 8);
        assert_eq!(reading.failed, 2);
    }
    #[test]
    fn all_failed_reads_fail_the_batch() {
        let mut sampler = Sampler::new(bench_at(Range::R0, vec![None; 10]), ADC_AVG_SAMPLES);
        let err = sampler.read_averaged(Range::R0).unwrap_err();
        assert!(matches!(err, AcquisitionError::BatchFailed { attempts: 10 }));
    }
    #[test]
    fn retries_recover_a_failed_slot() {
        let reads = vec![None, Some(300), Some(500)];
        let mut sampler = Sampler::new(bench_at(Range::R100K, reads), 2).with_retries(1);
        let reading = sampler.read_averaged(Range::R100K).unwrap();
        assert_eq!(reading.mean, 400.0);
        assert_eq!(reading.failed, 0);
        assert_eq!(sampler.into_inner().reads(), 3);
    }
    #[test]
    fn single_sample_batch_keeps_cause() {
        let mut sampler = Sampler::new(bench_at(Range::R0, vec![None]), 1);
        assert!(matches!(
            sampler.read_averaged(Range::R0),
            Err(AcquisitionError::Bus(_))
        ));
    }
}
