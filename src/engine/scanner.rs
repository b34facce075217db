//! The scan → detect → dedup → notify control loop.
//!
//! A single background task drives a three-state machine: `Unarmed` until
//! the operator supplies a credential, `WaitingForMarket` outside trading
//! hours, `Scanning` otherwise. Every iteration re-checks armed state and
//! the market window. Instruments are processed sequentially with a pacing
//! delay between them; every sleep is interruptible by the shutdown signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::calendar::MarketCalendar;
use crate::config::ScannerConfig;
use crate::detect::SignalDetector;
use crate::feed::{FetchError, OptionChainSource};
use crate::ledger::{lock, SharedLedger};
use crate::notify::{format_alert, format_auth_notice, Notifier};
use crate::session::SessionManager;
use crate::types::{InstrumentSpec, MomentumBook, OptionChainSnapshot};

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// The three distinct waits of the loop, plus intra-cycle pacing.
#[derive(Debug, Clone)]
pub struct Intervals {
    /// Unarmed: short, so a freshly submitted token is picked up quickly.
    pub idle: Duration,
    /// Market closed: long, no point busy-waiting overnight.
    pub market_closed: Duration,
    /// Steady-state polling cadence between cycles.
    pub cycle: Duration,
    /// Between instruments within a cycle (upstream rate limits).
    pub pacing: Duration,
}

impl From<&ScannerConfig> for Intervals {
    fn from(cfg: &ScannerConfig) -> Self {
        Self {
            idle: Duration::from_secs(cfg.idle_interval_secs),
            market_closed: Duration::from_secs(cfg.market_closed_interval_secs),
            cycle: Duration::from_secs(cfg.cycle_interval_secs),
            pacing: Duration::from_secs(cfg.pacing_delay_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unarmed,
    WaitingForMarket,
    Scanning,
}

/// Pure transition decision, re-evaluated at the top of every iteration.
pub fn phase_for(armed: bool, market_open: bool) -> Phase {
    match (armed, market_open) {
        (false, _) => Phase::Unarmed,
        (true, false) => Phase::WaitingForMarket,
        (true, true) => Phase::Scanning,
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Embargo delay after `failures` consecutive transient failures:
/// `base * 2^failures`, capped. Zero failures means no embargo.
fn backoff_delay(failures: u32, base: Duration, cap: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let mult = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
    base.checked_mul(mult).map(|d| d.min(cap)).unwrap_or(cap)
}

#[derive(Debug, Default)]
struct BackoffState {
    failures: u32,
    embargo_until: Option<Instant>,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct Scanner {
    feed: Arc<dyn OptionChainSource>,
    session: SessionManager,
    calendar: MarketCalendar,
    detector: SignalDetector,
    ledger: SharedLedger,
    notifier: Arc<dyn Notifier>,
    instruments: Vec<InstrumentSpec>,
    intervals: Intervals,
    /// Private to this task; no synchronization needed.
    momentum: MomentumBook,
    backoff: HashMap<u32, BackoffState>,
}

impl Scanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed: Arc<dyn OptionChainSource>,
        session: SessionManager,
        calendar: MarketCalendar,
        detector: SignalDetector,
        ledger: SharedLedger,
        notifier: Arc<dyn Notifier>,
        instruments: Vec<InstrumentSpec>,
        intervals: Intervals,
    ) -> Self {
        Self {
            feed,
            session,
            calendar,
            detector,
            ledger,
            notifier,
            instruments,
            intervals,
            momentum: MomentumBook::new(),
            backoff: HashMap::new(),
        }
    }

    /// Run until the shutdown signal fires. No terminal state otherwise.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut last_phase: Option<Phase> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let phase = phase_for(self.session.is_armed(), self.calendar.is_open(Utc::now()));
            if last_phase != Some(phase) {
                info!(?phase, "Scanner state");
                last_phase = Some(phase);
            }

            let wait = match phase {
                Phase::Unarmed => self.intervals.idle,
                Phase::WaitingForMarket => self.intervals.market_closed,
                Phase::Scanning => {
                    self.run_cycle(&mut shutdown).await;
                    self.intervals.cycle
                }
            };

            if interruptible_sleep(wait, &mut shutdown).await {
                break;
            }
        }

        info!("Scanner stopped");
    }

    /// One pass over all instruments. Public so integration-style tests can
    /// drive cycles without real waits.
    pub async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) {
        let Some(credential) = self.session.get() else {
            return;
        };
        let expiry = self.calendar.market_date(Utc::now());
        debug!(%expiry, instruments = self.instruments.len(), "Scan cycle start");

        let instruments = self.instruments.clone();
        let now = Instant::now();

        for (i, instrument) in instruments.iter().enumerate() {
            if self.embargoed(instrument, now) {
                debug!(instrument = %instrument.name, "In backoff embargo, skipping");
                continue;
            }

            let outcome = self.feed.fetch(instrument, &credential, expiry).await;
            match outcome {
                Ok(snapshot) => {
                    self.backoff.remove(&instrument.scrip_id);
                    self.process_snapshot(snapshot).await;
                }
                Err(FetchError::AuthExpired { body }) => {
                    warn!(
                        instrument = %instrument.name,
                        raw = %body,
                        "Access token rejected — disarming session"
                    );
                    self.session.clear();
                    if let Err(e) = self.notifier.send(&format_auth_notice()).await {
                        error!(error = %e, "Failed to deliver auth-expiry notice");
                    }
                    return;
                }
                Err(FetchError::EmptyData) => {
                    info!(instrument = %instrument.name, %expiry, "No option-chain data returned");
                    self.backoff.remove(&instrument.scrip_id);
                }
                Err(e) => {
                    warn!(instrument = %instrument.name, error = %e, "Fetch failed, skipping instrument");
                    if e.is_transient_failure() {
                        self.note_transient_failure(instrument);
                    }
                }
            }

            if i + 1 < instruments.len()
                && interruptible_sleep(self.intervals.pacing, shutdown).await
            {
                return;
            }
        }
    }

    /// Detect, dedup, and dispatch for one snapshot.
    async fn process_snapshot(&mut self, snapshot: OptionChainSnapshot) {
        let signals = self
            .detector
            .evaluate(&snapshot, &mut self.momentum, Utc::now());
        if signals.is_empty() {
            debug!(instrument = %snapshot.instrument, strikes = snapshot.strikes.len(), "No signals");
            return;
        }

        for signal in signals {
            // Ledger first: a delivery failure must not cause a re-send
            // storm, and a persistence failure must not stop the scan.
            let fresh = {
                let mut ledger = lock(&self.ledger);
                if ledger.has_fired(&signal) {
                    false
                } else {
                    if let Err(e) = ledger.record(&signal) {
                        error!(key = %signal.key, error = %e, "Ledger write failed — continuing degraded");
                    }
                    true
                }
            };

            if !fresh {
                debug!(key = %signal.key, "Signal already alerted, suppressed");
                continue;
            }

            info!(signal = %signal, "Institutional signal detected");
            if let Err(e) = self.notifier.send(&format_alert(&signal)).await {
                error!(
                    key = %signal.key,
                    error = %e,
                    "Notification delivery failed; signal stays recorded, no retry"
                );
            }
        }
    }

    // -- Backoff bookkeeping ---------------------------------------------

    fn embargoed(&self, instrument: &InstrumentSpec, now: Instant) -> bool {
        self.backoff
            .get(&instrument.scrip_id)
            .and_then(|b| b.embargo_until)
            .is_some_and(|until| now < until)
    }

    fn note_transient_failure(&mut self, instrument: &InstrumentSpec) {
        let entry = self.backoff.entry(instrument.scrip_id).or_default();
        entry.failures += 1;
        let delay = backoff_delay(
            entry.failures,
            self.intervals.pacing,
            self.intervals.market_closed,
        );
        entry.embargo_until = Some(Instant::now() + delay);
        warn!(
            instrument = %instrument.name,
            consecutive_failures = entry.failures,
            embargo_secs = delay.as_secs(),
            "Backing off instrument"
        );
    }
}

/// Sleep, racing the shutdown signal. Returns true when shutdown fired.
async fn interruptible_sleep(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.changed() => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
