//! Outbound notifications.
//!
//! Defines the `Notifier` trait, the alert message formats, and the
//! Telegram implementation. Delivery failure is the caller's problem to
//! log and move past — a detected signal stays recorded either way.

pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{OptionSide, Signal};

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. Markdown-style bold/italic markers are
    /// cosmetic; channels free to ignore them.
    async fn send(&self, text: &str) -> Result<()>;
}

/// Render the institutional-activity alert for one signal.
pub fn format_alert(signal: &Signal) -> String {
    let side_label = match signal.key.side {
        OptionSide::Call => "🏛️ INSTITUTIONAL CALL",
        OptionSide::Put => "🏛️ INSTITUTIONAL PUT",
    };
    format!(
        "⚔️ *ZENITH ORDER FLOW* ⚔️\n\n\
         Index: *{index}*\n\
         Signal: *{side_label}*\n\
         Strike: *{strike}*\n\
         Price: ₹{price}\n\n\
         📊 *BLOCK METRICS:*\n\
         └ Volume: {volume}\n\
         └ Open Interest: {oi}\n\n\
         🔥 _Detection: Smart Money Activity_",
        index = signal.key.instrument,
        strike = signal.key.strike.normalize(),
        price = signal.last_price,
        volume = group_thousands(signal.volume),
        oi = group_thousands(signal.oi),
    )
}

/// Operator notice sent when the upstream rejects the daily token.
pub fn format_auth_notice() -> String {
    "⚠️ *ZENITH: Access token expired.*\n\
     Scanning paused. Send a fresh daily token to re-arm."
        .to_string()
}

/// `1234567` → `1,234,567`.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalKey;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_signal() -> Signal {
        Signal {
            key: SignalKey {
                instrument: "NIFTY".to_string(),
                strike: dec!(20000.000000),
                side: OptionSide::Call,
            },
            volume: 160_000,
            oi: 80_000,
            last_price: dec!(120.5),
            volume_delta: 25_000,
            oi_delta: 12_000,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(160_000), "160,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_alert_names_index_strike_side_and_metrics() {
        let text = format_alert(&sample_signal());
        assert!(text.contains("NIFTY"));
        assert!(text.contains("20000"));
        assert!(text.contains("INSTITUTIONAL CALL"));
        assert!(text.contains("160,000"));
        assert!(text.contains("80,000"));
        assert!(text.contains("₹120.5"));
    }

    #[test]
    fn test_put_side_label() {
        let mut signal = sample_signal();
        signal.key.side = OptionSide::Put;
        assert!(format_alert(&signal).contains("INSTITUTIONAL PUT"));
    }

    #[test]
    fn test_auth_notice_mentions_rearming() {
        let text = format_auth_notice();
        assert!(text.contains("token expired"));
        assert!(text.contains("re-arm"));
    }
}
