//! Detector → ledger → formatting, driven through the public API the way
//! the scan loop drives it, including a restart in the middle.

use chrono::Utc;
use rust_decimal_macros::dec;

use zenith::config::DedupPolicy;
use zenith::detect::{DetectorConfig, SignalDetector};
use zenith::ledger::AlertLedger;
use zenith::notify::format_alert;
use zenith::types::{MomentumBook, OptionChainSnapshot, SideQuote, StrikeEntry};

fn snapshot(instrument: &str, volume: u64, oi: u64) -> OptionChainSnapshot {
    let mut strikes = std::collections::HashMap::new();
    strikes.insert(
        dec!(20000),
        StrikeEntry {
            call: SideQuote { volume, oi, last_price: dec!(120.5) },
            put: SideQuote { volume: 100, oi: 50, last_price: dec!(45) },
        },
    );
    OptionChainSnapshot {
        instrument: instrument.to_string(),
        expiry: chrono::NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
        strikes,
    }
}

fn temp_ledger_path() -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("zenith_pipeline_{}.json", uuid::Uuid::new_v4()));
    p
}

#[test]
fn detect_dedup_restart_redetect() {
    let path = temp_ledger_path();
    let detector = SignalDetector::new(DetectorConfig::default());
    let mut book = MomentumBook::new();

    // Cycle 1: qualifies on volume level, recorded and formatted.
    {
        let mut ledger =
            AlertLedger::open(Some(path.clone()), DedupPolicy::KeyAndValues).unwrap();
        let signals = detector.evaluate(&snapshot("NIFTY", 160_000, 80_000), &mut book, Utc::now());
        assert_eq!(signals.len(), 1);

        let signal = &signals[0];
        assert!(!ledger.has_fired(signal));
        ledger.record(signal).unwrap();

        let text = format_alert(signal);
        assert!(text.contains("NIFTY"));
        assert!(text.contains("160,000"));
    }

    // Process restart: a fresh ledger over the same file still suppresses
    // the identical tuple, and momentum state starts over without harm.
    let mut ledger = AlertLedger::open(Some(path.clone()), DedupPolicy::KeyAndValues).unwrap();
    let mut fresh_book = MomentumBook::new();

    let repeat = detector.evaluate(&snapshot("NIFTY", 160_000, 80_000), &mut fresh_book, Utc::now());
    assert_eq!(repeat.len(), 1);
    assert!(ledger.has_fired(&repeat[0]));

    // Fresh activity (volume rose) is a new alert under the default policy.
    let risen = detector.evaluate(&snapshot("NIFTY", 210_000, 80_000), &mut fresh_book, Utc::now());
    assert_eq!(risen.len(), 1);
    assert_eq!(risen[0].volume_delta, 50_000);
    assert!(!ledger.has_fired(&risen[0]));
    ledger.record(&risen[0]).unwrap();
    assert_eq!(ledger.len(), 2);

    std::fs::remove_file(path).unwrap();
}

#[test]
fn quiet_chain_never_alerts() {
    let detector = SignalDetector::new(DetectorConfig::default());
    let mut book = MomentumBook::new();
    let ledger = AlertLedger::open(None, DedupPolicy::KeyAndValues).unwrap();

    for _ in 0..3 {
        let signals =
            detector.evaluate(&snapshot("BANKNIFTY", 1_000, 2_000), &mut book, Utc::now());
        assert!(signals.is_empty());
    }
    assert!(ledger.is_empty());
}
