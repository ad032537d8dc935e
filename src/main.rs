// src/main.rs
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use pinprofiler::capture::ProfileCapture;
use pinprofiler::compliance::{ComplianceAnalyzer, ComplianceVerdict, SampleSet};
use pinprofiler::config::BenchConfig;
use pinprofiler::drivers::{
    Measurement, PinSelect, RangeControl, RawAdc, ResistanceEngine, SerialBench, SimulatedBench,
};
use pinprofiler::recorder::MeasurementRecorder;
use pinprofiler::store::{JsonProfileStore, ProfileStore};
use pinprofiler::types::{ConnectionMode, EcuType, Profile};

#[derive(Parser)]
#[command(name = "pinprofiler")]
#[command(version)]
#[command(about = "Auto-ranging pin resistance profiler with population compliance check", long_about = None)]
struct Cli {
    /// Bench config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the simulated bench instead of the serial front-end
    #[arg(long)]
    simulate: bool,

    /// Debug-level logging (RUST_LOG still wins when set)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new ECU type
    CreateEcu {
        #[arg(long)]
        name: String,
        #[arg(long)]
        pins: usize,
    },
    /// List ECU types and how many profiles each has
    List,
    /// Measure one pin repeatedly
    Measure {
        #[arg(long, default_value = "0")]
        pin: usize,
        #[arg(long, default_value = "1")]
        cycles: usize,
    },
    /// Capture every pin of a unit, check it against the population and store it
    Profile {
        #[arg(long)]
        ecu: String,
        /// Part number printed on the unit
        #[arg(long, default_value = "")]
        reference: String,
        #[arg(long, default_value = "0")]
        db_number: u32,
        /// Store the profile even when the check fails
        #[arg(long)]
        save_always: bool,
        /// Never store the profile
        #[arg(long, conflicts_with = "save_always")]
        dry_run: bool,
    },
    /// Check a profile from a JSON file (array of numbers) against the population
    Check {
        #[arg(long)]
        ecu: String,
        #[arg(long)]
        profile: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    let mode = if cli.simulate {
        ConnectionMode::Simulation
    } else {
        ConnectionMode::Hardware
    };

    match cli.command {
        Command::CreateEcu { name, pins } => {
            let mut store = open_store(&config)?;
            let ecu = store.create_ecu(&name, pins)?;
            println!("created {} ({} pins)", ecu.name, ecu.pin_count);
        }
        Command::List => {
            let store = open_store(&config)?;
            for ecu in store.ecus() {
                let population = store.get_population(&ecu)?;
                println!(
                    "{:<20} {:>4} pins {:>5} profiles",
                    ecu.name,
                    ecu.pin_count,
                    population.len()
                );
            }
        }
        Command::Measure { pin, cycles } => match mode {
            ConnectionMode::Hardware => {
                run_measure(SerialBench::open(&config.serial)?, &config, pin, cycles)?
            }
            ConnectionMode::Simulation => {
                run_measure(simulated_bench(&config, "bench", pin + 1), &config, pin, cycles)?
            }
        },
        Command::Profile {
            ecu,
            reference,
            db_number,
            save_always,
            dry_run,
        } => {
            let mut store = open_store(&config)?;
            let ecu = store.ecu(&ecu)?;
            let profile = match mode {
                ConnectionMode::Hardware => {
                    capture_profile(SerialBench::open(&config.serial)?, &config, &ecu)?
                }
                ConnectionMode::Simulation => {
                    let bench = simulated_bench(&config, &ecu.name, ecu.pin_count);
                    capture_profile(bench, &config, &ecu)?
                }
            };
            let profile = profile.with_reference(reference, db_number);
            let population = store.get_population(&ecu)?;
            let compliant = if population.is_empty()
                && config.compliance.sample_set == SampleSet::PopulationOnly
            {
                warn!("no known-good profiles for {} yet; seeding the population", ecu.name);
                true
            } else {
                let verdict = ComplianceAnalyzer::new(config.compliance)
                    .evaluate_for(&ecu, &profile, &population)?;
                print_verdict(&verdict);
                verdict.is_compliant()
            };
            if !dry_run && (compliant || save_always) {
                store.save(&ecu, profile)?;
                println!("profile stored ({} in population)", population.len() + 1);
            }
        }
        Command::Check { ecu, profile } => {
            let store = open_store(&config)?;
            let ecu = store.ecu(&ecu)?;
            let text = fs::read_to_string(&profile)
                .with_context(|| format!("failed to read profile {}", profile.display()))?;
            let values: Vec<f64> = serde_json::from_str(&text).with_context(|| {
                format!("profile {} is not a JSON number array", profile.display())
            })?;
            let population = store.get_population(&ecu)?;
            let verdict = ComplianceAnalyzer::new(config.compliance)
                .evaluate_for(&ecu, &Profile::new(values), &population)?;
            print_verdict(&verdict);
        }
    }
    Ok(())
}

fn open_store(config: &BenchConfig) -> Result<JsonProfileStore> {
    JsonProfileStore::open(&config.store_path)
        .with_context(|| format!("failed to open profile store {}", config.store_path.display()))
}

fn open_recorder(config: &BenchConfig) -> Result<Option<MeasurementRecorder>> {
    config
        .recording_path
        .as_ref()
        .map(|path| {
            MeasurementRecorder::create(path)
                .with_context(|| format!("failed to create recording {}", path.display()))
        })
        .transpose()
}

fn simulated_bench(config: &BenchConfig, name: &str, pin_count: usize) -> SimulatedBench {
    // Same ECU name, same virtual unit.
    let seed = name.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    });
    info!("using simulated bench ({pin_count} pins)");
    SimulatedBench::random(
        pin_count,
        50.0,
        200_000.0,
        config.calibration.adc_max_sample_points,
        seed,
    )
    .with_noise(15.0)
}

fn run_measure<B: RawAdc + RangeControl + PinSelect>(
    bench: B,
    config: &BenchConfig,
    pin: usize,
    cycles: usize,
) -> Result<()> {
    let engine = ResistanceEngine::new(bench, config.calibration, config.acquisition);
    let mut capture = ProfileCapture::new(engine, config.capture);
    let mut recorder = open_recorder(config)?;
    for cycle in 0..cycles {
        match capture.measure(pin) {
            Ok(m) => {
                match m {
                    Measurement::Resistance { value, range, raw } => println!(
                        "#{cycle} pin {pin}: raw {raw:>8.1}  {value:>10.4} {range}  ({:.1})",
                        m.scaled_value().unwrap_or_default()
                    ),
                    _ => println!(
                        "#{cycle} pin {pin}: raw {:>8.1}  {}",
                        m.raw(),
                        m.outcome_label()
                    ),
                }
                if let Some(rec) = recorder.as_mut() {
                    rec.write_record(pin, &m)?;
                }
            }
            // Retry policy belongs to the operator: report and keep going.
            Err(err) => warn!("#{cycle}: {err}"),
        }
    }
    if let Some(rec) = recorder.as_mut() {
        rec.flush()?;
    }
    Ok(())
}

fn capture_profile<B: RawAdc + RangeControl + PinSelect>(
    bench: B,
    config: &BenchConfig,
    ecu: &EcuType,
) -> Result<Profile> {
    let engine = ResistanceEngine::new(bench, config.calibration, config.acquisition);
    let mut capture = ProfileCapture::new(engine, config.capture);
    let captured = capture
        .capture(ecu)
        .with_context(|| format!("capture of {} failed", ecu.name))?;
    if let Some(mut rec) = open_recorder(config)? {
        for reading in &captured.readings {
            rec.write_record(reading.pin, &reading.measurement)?;
        }
        rec.flush()?;
    }
    Ok(captured.profile)
}

fn print_verdict(verdict: &ComplianceVerdict) {
    match verdict {
        ComplianceVerdict::Compliant => println!("ECU IS COMPLIANT UNDER STANDARD PROFILING"),
        ComplianceVerdict::Findings(records) => {
            println!(
                "{:<7} {:>4} {:>14} {:>12} {:>14} {:>10}",
                "STATUS", "PIN", "MEAN", "STDEV", "OBSERVED", "DEV %"
            );
            for r in records {
                let dev = r
                    .deviation_percent
                    .map(|d| format!("{d:.2}"))
                    .unwrap_or_else(|| "-".to_string());
                let marker = r.degeneracy.map(|d| format!(" ({d:?})")).unwrap_or_default();
                println!(
                    "{:<7} {:>4} {:>14.4} {:>12.4} {:>14.4} {:>10}{}",
                    r.status, r.pin, r.mean, r.stdev, r.observed, dev, marker
                );
            }
        }
    }
}
