//! Shared types for the ZENITH scanner.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that feed, detection, ledger and
//! engine modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Instruments
// ---------------------------------------------------------------------------

/// A tracked index, static for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Upstream security identifier (e.g. 13 for NIFTY, 25 for BANKNIFTY).
    pub scrip_id: u32,
    /// Display name used in signal keys and alert messages.
    pub name: String,
    /// Upstream segment code, `"IDX_I"` for index options.
    pub segment: String,
}

impl fmt::Display for InstrumentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.scrip_id)
    }
}

// ---------------------------------------------------------------------------
// Option chain snapshot
// ---------------------------------------------------------------------------

/// Call or put side of a strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    Call,
    Put,
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionSide::Call => write!(f, "CE"),
            OptionSide::Put => write!(f, "PE"),
        }
    }
}

/// Per-side quote at a single strike.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideQuote {
    pub volume: u64,
    /// Open interest (outstanding contracts).
    pub oi: u64,
    pub last_price: Decimal,
}

/// Both sides of one strike.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrikeEntry {
    pub call: SideQuote,
    pub put: SideQuote,
}

impl StrikeEntry {
    pub fn quote(&self, side: OptionSide) -> &SideQuote {
        match side {
            OptionSide::Call => &self.call,
            OptionSide::Put => &self.put,
        }
    }
}

/// Normalized option chain for one instrument at one expiry.
///
/// Strike keys are unique within a snapshot; no ordering is guaranteed.
#[derive(Debug, Clone)]
pub struct OptionChainSnapshot {
    pub instrument: String,
    pub expiry: NaiveDate,
    pub strikes: HashMap<Decimal, StrikeEntry>,
}

impl OptionChainSnapshot {
    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Identity under which momentum and dedup state are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalKey {
    pub instrument: String,
    pub strike: Decimal,
    pub side: OptionSide,
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.instrument, self.strike.normalize(), self.side)
    }
}

/// A strike/side that qualified as an institutional signal this cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub key: SignalKey,
    pub volume: u64,
    pub oi: u64,
    pub last_price: Decimal,
    /// Cycle-over-cycle change; zero on first observation of the key.
    pub volume_delta: i64,
    pub oi_delta: i64,
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (vol: {} Δ{} | oi: {} Δ{} | ₹{})",
            self.key, self.volume, self.volume_delta, self.oi, self.oi_delta, self.last_price,
        )
    }
}

/// A dispatched (or suppressed-as-duplicate) signal as persisted by the
/// alert ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub key: SignalKey,
    pub volume: u64,
    pub oi: u64,
    pub last_price: Decimal,
    pub first_detected_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            key: signal.key.clone(),
            volume: signal.volume,
            oi: signal.oi,
            last_price: signal.last_price,
            first_detected_at: signal.detected_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Momentum state
// ---------------------------------------------------------------------------

/// Last observed reading for a key, the baseline for next cycle's deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorReading {
    pub volume: u64,
    pub oi: u64,
}

/// Per-key momentum state, private to the scanner task.
///
/// Updated every cycle regardless of whether a signal fired, so deltas are
/// always cycle-over-cycle rather than against a stale baseline.
pub type MomentumBook = HashMap<SignalKey, PriorReading>;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

#[cfg(test)]
impl OptionChainSnapshot {
    /// Build a snapshot with a single populated strike.
    pub fn single(instrument: &str, strike: Decimal, call: SideQuote, put: SideQuote) -> Self {
        let mut strikes = HashMap::new();
        strikes.insert(strike, StrikeEntry { call, put });
        OptionChainSnapshot {
            instrument: instrument.to_string(),
            expiry: NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            strikes,
        }
    }
}

#[cfg(test)]
impl SideQuote {
    pub fn of(volume: u64, oi: u64, last_price: Decimal) -> Self {
        SideQuote { volume, oi, last_price }
    }
}
