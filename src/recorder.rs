use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::drivers::Measurement;

/// CSV log of every acquisition cycle, one row per pin reading.
pub struct MeasurementRecorder<W: Write = BufWriter<File>> {
    writer: W,
}

impl MeasurementRecorder {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path.as_ref())?;
        log::info!("recording measurements to {}", path.as_ref().display());
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> MeasurementRecorder<W> {
    pub fn new(mut writer: W) -> std::io::Result<Self> {
        writeln!(writer, "timestamp,pin,range,raw,outcome,value")?;
        Ok(Self { writer })
    }

    pub fn write_record(&mut self, pin: usize, measurement: &Measurement) -> std::io::Result<()> {
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let value = match measurement {
            Measurement::Resistance { value, .. } => format!("{value:.6}"),
            _ => String::new(),
        };
        writeln!(
            self.writer,
            "{:.3},{},{},{:.1},{},{}",
            t,
            pin,
            measurement.range(),
            measurement.raw(),
            measurement.outcome_label(),
            value
        )
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::Range;

    #[test]
    fn writes_header_and_rows() {
        let mut rec = MeasurementRecorder::new(Vec::new()).unwrap();
        rec.write_record(
            4,
            &Measurement::Resistance {
                value: 2.5,
                range: Range::R10K,
                raw: 13800.0,
            },
        )
        .unwrap();
        rec.write_record(5, &Measurement::OpenCircuit { raw: 30800.0 }).unwrap();
        let text = String::from_utf8(rec.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,pin,range,raw,outcome,value");
        assert!(lines[1].ends_with(",4,/10K,13800.0,resistance,2.500000"));
        assert!(lines[2].ends_with(",5,/100K,30800.0,open,"));
    }

    #[test]
    fn create_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut rec = MeasurementRecorder::create(&path).unwrap();
        rec.write_record(0, &Measurement::ShortCircuit { raw: 12.0 }).unwrap();
        rec.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(",0,ohm,12.0,short,"));
    }
}
