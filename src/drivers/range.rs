use std::fmt;
use serde::{Deserialize, Serialize};
/// One of the four divider resistances switched in series with the unknown load.
///
/// Variants are ordered from the highest to the lowest divider impedance, which is
/// also the order the autorange sweep walks them in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Range {
    R100K,
    R10K,
    R1K,
    R0,
}
impl Range {
    /// Sweep order, highest impedance first.
    pub const ALL: [Range; 4] = [Range::R100K, Range::R10K, Range::R1K, Range::R0];
    pub const HIGHEST: Range = Range::R100K;
    pub const LOWEST: Range = Range::R0;
    /// 2-bit mux select code (S1, S0).
    pub fn select_code(self) -> u8 {
        match self {
            Range::R100K => 0b00,
            Range::R10K => 0b01,
            Range::R1K => 0b10,
            Range::R0 => 0b11,
        }
    }
    pub fn from_select_code(code: u8) -> Option<Range> {
        Range::ALL.into_iter().find(|r| r.select_code() == code)
    }
    pub fn label(self) -> &'static str {
        match self {
            Range::R100K => "/100K",
            Range::R10K => "/10K",
            Range::R1K => "/1K",
            Range::R0 => "ohm",
        }
    }
    /// Factor that turns a calibrated value at this range into plain ohms.
    pub fn multiplier(self) -> f64 {
        match self {
            Range::R100K => 100_000.0,
            Range::R10K => 10_000.0,
            Range::R1K => 1_000.0,
            Range::R0 => 1.0,
        }
    }
    /// Physical divider resistor fitted for this range (ohms).
    pub fn divider_ohms(self) -> f64 {
        match self {
            Range::R100K => 249_000.0,
            Range::R10K => 24_900.0,
            Range::R1K => 2_490.0,
            Range::R0 => 24.9,
        }
    }
    pub fn next_lower(self) -> Option<Range> {
        match self {
            Range::R100K => Some(Range::R10K),
            Range::R10K => Some(Range::R1K),
            Range::R1K => Some(Range::R0),
            Range::R0 => None,
        }
    }
    pub fn is_highest(self) -> bool {
        self == Range::HIGHEST
    }
    pub fn is_lowest(self) -> bool {
        self == Range::LOWEST
    }
}
impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}
/// What the sweep should do after an averaged reading at some range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RangeDecision {
    /// The reading is usable; stop the sweep here.
    Settle,
    /// Still below the floor; try the next lower-impedance range.
    Advance(Range),
    /// Below the floor on the last range.
    Exhausted,
}
/// Decides whether the active range gives a usable reading.
#[derive(Clone, Copy, Debug)]
pub struct RangeSelector {
    autorange_floor: f64,
}
impl RangeSelector {
    pub fn new(autorange_floor: f64) -> Self {
        Self { autorange_floor }
    }
    pub fn autorange_floor(&self) -> f64 {
        self.autorange_floor
    }
    pub fn decide(&self, current: Range, averaged: f64) -> RangeDecision {
        if averaged >= self.autorange_floor {
            return RangeDecision::Settle;
        }
        match current.next_lower() {
            Some(next) => RangeDecision::Advance(next),
            None => RangeDecision::Exhausted,
        }
    }
}
