//! Alert dedup ledger.
//!
//! Persistent record of previously-dispatched signals, used to suppress
//! repeats. Backed by a JSON file rewritten on mutation so a restart does
//! not re-notify; `None` path keeps the ledger purely in memory (tests).
//!
//! Sequencing within the scan loop is sequential by construction; the
//! ledger is shared behind a mutex only because the operator's re-arm
//! resets it from the control server task.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::DedupPolicy;
use crate::types::{AlertRecord, Signal};

/// Handle shared between the scanner task and the control server.
pub type SharedLedger = Arc<Mutex<AlertLedger>>;

/// Lock the shared ledger, recovering from a poisoned mutex — a panicked
/// holder must not take alert dedup down with it.
pub fn lock(ledger: &SharedLedger) -> MutexGuard<'_, AlertLedger> {
    match ledger.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    records: Vec<AlertRecord>,
}

/// Durable set of already-alerted signals.
pub struct AlertLedger {
    records: Vec<AlertRecord>,
    policy: DedupPolicy,
    path: Option<PathBuf>,
}

impl AlertLedger {
    /// Open the ledger, loading any previously persisted records.
    /// A missing file is a fresh start, not an error.
    pub fn open(path: Option<PathBuf>, policy: DedupPolicy) -> Result<Self> {
        let records = match &path {
            Some(p) if p.exists() => {
                let json = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read alert ledger {}", p.display()))?;
                let file: LedgerFile = serde_json::from_str(&json)
                    .with_context(|| format!("Failed to parse alert ledger {}", p.display()))?;
                info!(path = %p.display(), records = file.records.len(), "Alert ledger loaded");
                file.records
            }
            Some(p) => {
                info!(path = %p.display(), "No alert ledger found, starting fresh");
                Vec::new()
            }
            None => Vec::new(),
        };

        Ok(Self { records, policy, path })
    }

    pub fn into_shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    /// Whether an alert for this signal was already dispatched.
    ///
    /// Under `KeyAndValues` (the default) a changed volume or OI reading is
    /// fresh activity and fires again; under `KeyOnly` a key fires once
    /// until `reset`.
    pub fn has_fired(&self, signal: &Signal) -> bool {
        self.records.iter().any(|r| match self.policy {
            DedupPolicy::KeyOnly => r.key == signal.key,
            DedupPolicy::KeyAndValues => {
                r.key == signal.key && r.volume == signal.volume && r.oi == signal.oi
            }
        })
    }

    /// Record a dispatched signal and persist. Recording an already-fired
    /// signal is a no-op.
    pub fn record(&mut self, signal: &Signal) -> Result<()> {
        if self.has_fired(signal) {
            return Ok(());
        }
        self.records.push(AlertRecord::from_signal(signal));
        self.persist()?;
        debug!(key = %signal.key, total = self.records.len(), "Alert recorded");
        Ok(())
    }

    /// Drop all records. Invoked deliberately when the operator arms a new
    /// credential: a new trading session warrants fresh detection.
    pub fn reset(&mut self) -> Result<()> {
        let dropped = self.records.len();
        self.records.clear();
        self.persist()?;
        info!(dropped, "Alert ledger reset");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = LedgerFile {
            records: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .context("Failed to serialise alert ledger")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write alert ledger {}", path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OptionSide, SignalKey};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("zenith_test_ledger_{}.json", uuid::Uuid::new_v4()));
        p
    }

    fn signal(volume: u64, oi: u64) -> Signal {
        Signal {
            key: SignalKey {
                instrument: "NIFTY".to_string(),
                strike: dec!(20000),
                side: OptionSide::Call,
            },
            volume,
            oi,
            last_price: dec!(120.5),
            volume_delta: 0,
            oi_delta: 0,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_fresh_signal_not_fired() {
        let ledger = AlertLedger::open(None, DedupPolicy::KeyAndValues).unwrap();
        assert!(!ledger.has_fired(&signal(160_000, 80_000)));
    }

    #[test]
    fn test_record_then_has_fired() {
        let mut ledger = AlertLedger::open(None, DedupPolicy::KeyAndValues).unwrap();
        ledger.record(&signal(160_000, 80_000)).unwrap();
        assert!(ledger.has_fired(&signal(160_000, 80_000)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_value_tuple_change_is_fresh() {
        let mut ledger = AlertLedger::open(None, DedupPolicy::KeyAndValues).unwrap();
        ledger.record(&signal(160_000, 80_000)).unwrap();
        // Volume rose — new, distinct alert under the default policy.
        assert!(!ledger.has_fired(&signal(210_000, 80_000)));
        // OI change alone also counts.
        assert!(!ledger.has_fired(&signal(160_000, 90_000)));
    }

    #[test]
    fn test_key_only_policy_suppresses_value_changes() {
        let mut ledger = AlertLedger::open(None, DedupPolicy::KeyOnly).unwrap();
        ledger.record(&signal(160_000, 80_000)).unwrap();
        assert!(ledger.has_fired(&signal(210_000, 90_000)));
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut ledger = AlertLedger::open(None, DedupPolicy::KeyAndValues).unwrap();
        ledger.record(&signal(160_000, 80_000)).unwrap();
        ledger.record(&signal(160_000, 80_000)).unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_reset_clears() {
        let mut ledger = AlertLedger::open(None, DedupPolicy::KeyAndValues).unwrap();
        ledger.record(&signal(160_000, 80_000)).unwrap();
        ledger.reset().unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.has_fired(&signal(160_000, 80_000)));
    }

    #[test]
    fn test_survives_restart() {
        let path = temp_path();

        let mut ledger =
            AlertLedger::open(Some(path.clone()), DedupPolicy::KeyAndValues).unwrap();
        ledger.record(&signal(160_000, 80_000)).unwrap();
        drop(ledger);

        // Fresh instance over the same file: identical tuple reports fired.
        let reopened = AlertLedger::open(Some(path.clone()), DedupPolicy::KeyAndValues).unwrap();
        assert!(reopened.has_fired(&signal(160_000, 80_000)));
        assert!(!reopened.has_fired(&signal(210_000, 80_000)));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_reset_persists() {
        let path = temp_path();

        let mut ledger =
            AlertLedger::open(Some(path.clone()), DedupPolicy::KeyAndValues).unwrap();
        ledger.record(&signal(160_000, 80_000)).unwrap();
        ledger.reset().unwrap();
        drop(ledger);

        let reopened = AlertLedger::open(Some(path.clone()), DedupPolicy::KeyAndValues).unwrap();
        assert!(reopened.is_empty());

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_open_missing_file_starts_fresh() {
        let ledger =
            AlertLedger::open(Some(temp_path()), DedupPolicy::KeyAndValues).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_shared_lock_recovers_from_poison() {
        let shared = AlertLedger::open(None, DedupPolicy::KeyAndValues)
            .unwrap()
            .into_shared();
        let clone = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison the mutex");
        })
        .join();

        // Administrative reset still works after the panic.
        lock(&shared).reset().unwrap();
    }
}
