// src/store.rs
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EcuType, Profile};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ECU type {0:?} already exists")]
    DuplicateEcu(String),
    #[error("unknown ECU type {0:?}")]
    UnknownEcu(String),
    #[error("pin count must be greater than zero")]
    InvalidPinCount,
    #[error("profile has {actual} pins but {ecu} declares {expected}")]
    PinCountMismatch {
        ecu: String,
        expected: usize,
        actual: usize,
    },
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where known-good profiles live, grouped by ECU type.
pub trait ProfileStore {
    fn create_ecu(&mut self, name: &str, pin_count: usize) -> Result<EcuType, StoreError>;
    fn ecu(&self, name: &str) -> Result<EcuType, StoreError>;
    fn ecus(&self) -> Vec<EcuType>;
    /// All stored profiles for `ecu`, in no particular order.
    fn get_population(&self, ecu: &EcuType) -> Result<Vec<Profile>, StoreError>;
    fn save(&mut self, ecu: &EcuType, profile: Profile) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EcuEntry {
    ecu: EcuType,
    profiles: Vec<Profile>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreData {
    ecus: Vec<EcuEntry>,
}

impl StoreData {
    fn entry(&self, name: &str) -> Result<&EcuEntry, StoreError> {
        self.ecus
            .iter()
            .find(|e| e.ecu.name == name)
            .ok_or_else(|| StoreError::UnknownEcu(name.to_string()))
    }

    fn create_ecu(&mut self, name: &str, pin_count: usize) -> Result<EcuType, StoreError> {
        if pin_count == 0 {
            return Err(StoreError::InvalidPinCount);
        }
        if self.entry(name).is_ok() {
            return Err(StoreError::DuplicateEcu(name.to_string()));
        }
        let ecu = EcuType {
            name: name.to_string(),
            pin_count,
        };
        self.ecus.push(EcuEntry {
            ecu: ecu.clone(),
            profiles: Vec::new(),
        });
        Ok(ecu)
    }

    fn save(&mut self, ecu: &EcuType, profile: Profile) -> Result<(), StoreError> {
        let entry = self
            .ecus
            .iter_mut()
            .find(|e| e.ecu.name == ecu.name)
            .ok_or_else(|| StoreError::UnknownEcu(ecu.name.clone()))?;
        // The stored pin count wins over whatever the caller passed in.
        if profile.pin_count() != entry.ecu.pin_count {
            return Err(StoreError::PinCountMismatch {
                ecu: entry.ecu.name.clone(),
                expected: entry.ecu.pin_count,
                actual: profile.pin_count(),
            });
        }
        entry.profiles.push(profile);
        Ok(())
    }
}

/// Volatile store, handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: StoreData,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryStore {
    fn create_ecu(&mut self, name: &str, pin_count: usize) -> Result<EcuType, StoreError> {
        self.data.create_ecu(name, pin_count)
    }

    fn ecu(&self, name: &str) -> Result<EcuType, StoreError> {
        self.data.entry(name).map(|e| e.ecu.clone())
    }

    fn ecus(&self) -> Vec<EcuType> {
        self.data.ecus.iter().map(|e| e.ecu.clone()).collect()
    }

    fn get_population(&self, ecu: &EcuType) -> Result<Vec<Profile>, StoreError> {
        self.data.entry(&ecu.name).map(|e| e.profiles.clone())
    }

    fn save(&mut self, ecu: &EcuType, profile: Profile) -> Result<(), StoreError> {
        self.data.save(ecu, profile)
    }
}

/// Store kept in a single JSON file, rewritten after every change.
pub struct JsonProfileStore {
    path: PathBuf,
    data: StoreData,
}

impl JsonProfileStore {
    /// Opens `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            debug!("profile store {} not found, starting empty", path.display());
            StoreData::default()
        };
        Ok(Self { path, data })
    }

    fn flush(&self) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut w = BufWriter::new(fs::File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut w, &self.data)?;
            w.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ProfileStore for JsonProfileStore {
    fn create_ecu(&mut self, name: &str, pin_count: usize) -> Result<EcuType, StoreError> {
        let ecu = self.data.create_ecu(name, pin_count)?;
        self.flush()?;
        info!("created ECU type {} ({} pins)", ecu.name, ecu.pin_count);
        Ok(ecu)
    }

    fn ecu(&self, name: &str) -> Result<EcuType, StoreError> {
        self.data.entry(name).map(|e| e.ecu.clone())
    }

    fn ecus(&self) -> Vec<EcuType> {
        self.data.ecus.iter().map(|e| e.ecu.clone()).collect()
    }

    fn get_population(&self, ecu: &EcuType) -> Result<Vec<Profile>, StoreError> {
        self.data.entry(&ecu.name).map(|e| e.profiles.clone())
    }

    fn save(&mut self, ecu: &EcuType, profile: Profile) -> Result<(), StoreError> {
        self.data.save(ecu, profile)?;
        self.flush()?;
        info!("saved profile for {} to {}", ecu.name, self.path.display());
        Ok(())
    }
}
