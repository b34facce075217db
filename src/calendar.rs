//! Trading-hours calendar.
//!
//! Answers whether an instant falls inside the exchange session, evaluated
//! in the market's own timezone regardless of where the host runs. The NSE
//! session is 09:15–15:30 IST; IST is a fixed +05:30 offset with no DST,
//! so a `FixedOffset` is sufficient and no tz database is needed.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};

use crate::config::MarketConfig;

/// Fixed trading window in a fixed-offset market timezone.
///
/// Stateless; pure function of wall-clock time.
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    offset: FixedOffset,
    open: NaiveTime,
    close: NaiveTime,
}

impl MarketCalendar {
    pub fn new(offset: FixedOffset, open: NaiveTime, close: NaiveTime) -> Self {
        Self { offset, open, close }
    }

    pub fn from_config(cfg: &MarketConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(cfg.utc_offset_minutes * 60)
            .context("Market UTC offset out of range")?;
        let open = NaiveTime::parse_from_str(&cfg.open, "%H:%M:%S")
            .with_context(|| format!("Invalid market open time: {}", cfg.open))?;
        let close = NaiveTime::parse_from_str(&cfg.close, "%H:%M:%S")
            .with_context(|| format!("Invalid market close time: {}", cfg.close))?;
        Ok(Self::new(offset, open, close))
    }

    /// Whether `now` is inside the trading window (both boundaries
    /// inclusive). Weekends are closed; exchange holidays are not modelled.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        match local.weekday() {
            Weekday::Sat | Weekday::Sun => return false,
            _ => {}
        }
        let time = local.time();
        time >= self.open && time <= self.close
    }

    /// Today's date in market time, used as the expiry of the scanned chain.
    pub fn market_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }
}
