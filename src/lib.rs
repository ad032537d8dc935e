// src/lib.rs
pub mod capture;
pub mod compliance;
pub mod config;
pub mod drivers;
pub mod recorder;
pub mod store;
pub mod types;
