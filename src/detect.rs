//! Institutional-signal detection.
//!
//! Compares each strike/side against absolute level thresholds and
//! cycle-over-cycle momentum deltas, and maintains the per-key momentum
//! book that makes the deltas meaningful.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::ScannerConfig;
use crate::types::{
    MomentumBook, OptionChainSnapshot, OptionSide, PriorReading, SideQuote, Signal, SignalKey,
};

// ---------------------------------------------------------------------------
// Configuration (defaults — overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

/// Detection thresholds. Absolute levels mark size; jump thresholds mark
/// same-cycle freshness.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub volume_threshold: u64,
    pub oi_threshold: u64,
    pub volume_jump_threshold: i64,
    pub oi_jump_threshold: i64,
    /// When set, a candidate must clear a jump threshold as well as a
    /// level threshold ("fresh entry" mode).
    pub require_momentum: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            volume_threshold: 150_000,
            oi_threshold: 75_000,
            volume_jump_threshold: 20_000,
            oi_jump_threshold: 10_000,
            require_momentum: false,
        }
    }
}

impl From<&ScannerConfig> for DetectorConfig {
    fn from(cfg: &ScannerConfig) -> Self {
        Self {
            volume_threshold: cfg.volume_threshold,
            oi_threshold: cfg.oi_threshold,
            volume_jump_threshold: cfg.volume_jump_threshold,
            oi_jump_threshold: cfg.oi_jump_threshold,
            require_momentum: cfg.require_momentum,
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct SignalDetector {
    config: DetectorConfig,
}

impl SignalDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Evaluate a snapshot against the momentum book.
    ///
    /// Every observed key's book entry is updated to the current reading
    /// whether or not it fired, so the next cycle's delta is always against
    /// the immediately preceding cycle.
    pub fn evaluate(
        &self,
        snapshot: &OptionChainSnapshot,
        book: &mut MomentumBook,
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        let mut signals = Vec::new();

        for (strike, entry) in &snapshot.strikes {
            for side in [OptionSide::Call, OptionSide::Put] {
                let key = SignalKey {
                    instrument: snapshot.instrument.clone(),
                    strike: *strike,
                    side,
                };
                if let Some(signal) = self.check(&key, entry.quote(side), book, now) {
                    signals.push(signal);
                }
            }
        }

        signals
    }

    /// Check a single strike/side and update its momentum entry.
    fn check(
        &self,
        key: &SignalKey,
        quote: &SideQuote,
        book: &mut MomentumBook,
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        // Missing prior state reads as a zero baseline: the first
        // observation of a key never shows a meaningful delta but may
        // still qualify on absolute level.
        let prior = book
            .get(key)
            .copied()
            .unwrap_or(PriorReading { volume: 0, oi: 0 });

        let volume_delta = quote.volume as i64 - prior.volume as i64;
        let oi_delta = quote.oi as i64 - prior.oi as i64;

        book.insert(
            key.clone(),
            PriorReading {
                volume: quote.volume,
                oi: quote.oi,
            },
        );

        let level_qualifies = quote.volume > self.config.volume_threshold
            || quote.oi > self.config.oi_threshold;
        if !level_qualifies {
            return None;
        }

        let momentum_qualifies = volume_delta > self.config.volume_jump_threshold
            || oi_delta > self.config.oi_jump_threshold;
        if self.config.require_momentum && !momentum_qualifies {
            debug!(%key, volume_delta, oi_delta, "Level qualified but momentum did not");
            return None;
        }

        Some(Signal {
            key: key.clone(),
            volume: quote.volume,
            oi: quote.oi,
            last_price: quote.last_price,
            volume_delta,
            oi_delta,
            detected_at: now,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
