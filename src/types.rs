// src/types.rs
use serde::{Deserialize, Serialize};

// Where measurements come from
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}

/// ECU family that profiles are grouped under. The pin count is fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcuType {
    pub name: String,
    pub pin_count: usize,
}

/// Ordered per-pin readings captured from one physical unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub values: Vec<f64>,
    // Part number printed on the unit (e.g. "0281011900")
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub db_number: u32,
}

impl Profile {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            reference: String::new(),
            db_number: 0,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>, db_number: u32) -> Self {
        self.reference = reference.into();
        self.db_number = db_number;
        self
    }

    pub fn pin_count(&self) -> usize {
        self.values.len()
    }
}
