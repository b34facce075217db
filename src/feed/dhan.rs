//! Dhan option-chain client.
//!
//! API: POST `{base}/v2/optionchain` with
//! `{"UnderlyingScrip": id, "UnderlyingSeg": "IDX_I", "Expiry": "YYYY-MM-DD"}`
//! and `access-token` / `client-id` headers.
//!
//! Success shape: `{"status": "success", "data": {"oc": {"<strike>":
//! {"ce": {...}, "pe": {...}}}}}`. Quote fields of interest: `volume`,
//! `oi`, `last_price`. Failure modes observed in production: HTML gateway
//! pages, 5xx, and `{"status": "error"}` on token expiry — classified in
//! `FetchError`.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

use super::{clip_raw, FetchError, OptionChainSource};
use crate::types::{InstrumentSpec, OptionChainSnapshot, SideQuote, StrikeEntry};

/// Request timeout; the scan loop must never block indefinitely.
const REQUEST_TIMEOUT_SECS: u64 = 15;

// ---------------------------------------------------------------------------
// API response types (Dhan JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChainResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<ChainData>,
}

#[derive(Debug, Deserialize)]
struct ChainData {
    /// Strike price (as string key) → both sides.
    #[serde(default)]
    oc: Option<HashMap<String, RawStrike>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStrike {
    #[serde(default)]
    ce: Option<RawQuote>,
    #[serde(default)]
    pe: Option<RawQuote>,
}

/// We only deserialize the fields we need; absent fields read as zero.
#[derive(Debug, Default, Deserialize)]
struct RawQuote {
    #[serde(default)]
    volume: u64,
    #[serde(default)]
    oi: u64,
    #[serde(default)]
    last_price: Decimal,
}

impl From<RawQuote> for SideQuote {
    fn from(raw: RawQuote) -> Self {
        SideQuote {
            volume: raw.volume,
            oi: raw.oi,
            last_price: raw.last_price,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Dhan HTTP client. The access token is per-request (it rotates daily and
/// lives in the session, not here); the client id is fixed per deployment.
pub struct DhanClient {
    http: Client,
    base_url: String,
    client_id: String,
}

impl DhanClient {
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("zenith/0.1.0 (order-flow-scanner)")
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            client_id: client_id.into(),
        })
    }

    /// Parse and normalize a raw response body into a snapshot.
    ///
    /// Split out from the HTTP path so classification is testable against
    /// canned bodies.
    fn parse_body(
        instrument: &InstrumentSpec,
        expiry: NaiveDate,
        raw: &str,
    ) -> Result<OptionChainSnapshot, FetchError> {
        let response: ChainResponse = serde_json::from_str(raw)
            .map_err(|_| FetchError::NonJson { raw: clip_raw(raw) })?;

        // An explicit error status means the daily token is no longer valid
        // (distinguishable from a well-formed-but-empty payload).
        if response.status.as_deref() == Some("error") {
            return Err(FetchError::AuthExpired { body: clip_raw(raw) });
        }

        let oc = response
            .data
            .and_then(|d| d.oc)
            .ok_or(FetchError::EmptyData)?;

        let mut strikes = HashMap::with_capacity(oc.len());
        for (strike_text, entry) in oc {
            let Ok(strike) = Decimal::from_str(strike_text.trim()) else {
                warn!(
                    instrument = %instrument.name,
                    strike = %strike_text,
                    "Skipping unparseable strike key"
                );
                continue;
            };
            strikes.insert(
                strike,
                StrikeEntry {
                    call: entry.ce.unwrap_or_default().into(),
                    put: entry.pe.unwrap_or_default().into(),
                },
            );
        }

        if strikes.is_empty() {
            return Err(FetchError::EmptyData);
        }

        Ok(OptionChainSnapshot {
            instrument: instrument.name.clone(),
            expiry,
            strikes,
        })
    }
}

#[async_trait]
impl OptionChainSource for DhanClient {
    async fn fetch(
        &self,
        instrument: &InstrumentSpec,
        credential: &SecretString,
        expiry: NaiveDate,
    ) -> Result<OptionChainSnapshot, FetchError> {
        let url = format!("{}/v2/optionchain", self.base_url);
        let payload = serde_json::json!({
            "UnderlyingScrip": instrument.scrip_id,
            "UnderlyingSeg": instrument.segment,
            "Expiry": expiry.format("%Y-%m-%d").to_string(),
        });

        debug!(instrument = %instrument.name, %expiry, "Fetching option chain");

        let resp = self
            .http
            .post(&url)
            .header("access-token", credential.expose_secret())
            .header("client-id", &self.client_id)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(FetchError::AuthExpired { body: clip_raw(&raw) });
        }
        if !status.is_success() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
                body: clip_raw(&raw),
            });
        }

        Self::parse_body(instrument, expiry, &raw)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn nifty() -> InstrumentSpec {
        InstrumentSpec {
            scrip_id: 13,
            name: "NIFTY".to_string(),
            segment: "IDX_I".to_string(),
        }
    }

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
    }

    #[test]
    fn test_parse_success_body() {
        let raw = r#"{
            "status": "success",
            "data": {"oc": {
                "20000.000000": {
                    "ce": {"volume": 160000, "oi": 80000, "last_price": 120.5},
                    "pe": {"volume": 5000, "oi": 2000, "last_price": 45.0}
                },
                "20100.000000": {
                    "ce": {"volume": 100, "oi": 50, "last_price": 80.0},
                    "pe": {"volume": 200, "oi": 75, "last_price": 60.0}
                }
            }}
        }"#;

        let snapshot = DhanClient::parse_body(&nifty(), expiry(), raw).unwrap();
        assert_eq!(snapshot.instrument, "NIFTY");
        assert_eq!(snapshot.strikes.len(), 2);

        let entry = &snapshot.strikes[&dec!(20000.000000)];
        assert_eq!(entry.call.volume, 160_000);
        assert_eq!(entry.call.oi, 80_000);
        assert_eq!(entry.call.last_price, dec!(120.5));
        assert_eq!(entry.put.volume, 5_000);
    }

    #[test]
    fn test_parse_missing_side_defaults_to_zero() {
        let raw = r#"{"data": {"oc": {"20000": {"ce": {"volume": 10}}}}}"#;
        let snapshot = DhanClient::parse_body(&nifty(), expiry(), raw).unwrap();
        let entry = &snapshot.strikes[&dec!(20000)];
        assert_eq!(entry.call.volume, 10);
        assert_eq!(entry.call.oi, 0);
        assert_eq!(entry.put, SideQuote::default());
    }

    #[test]
    fn test_parse_error_status_is_auth_expired() {
        let raw = r#"{"status": "error", "remarks": "invalid token", "data": {}}"#;
        let err = DhanClient::parse_body(&nifty(), expiry(), raw).unwrap_err();
        match err {
            FetchError::AuthExpired { body } => assert!(body.contains("invalid token")),
            other => panic!("expected AuthExpired, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_html_is_non_json() {
        let raw = "<html><body>502 Bad Gateway</body></html>";
        let err = DhanClient::parse_body(&nifty(), expiry(), raw).unwrap_err();
        match err {
            FetchError::NonJson { raw } => assert!(raw.contains("Bad Gateway")),
            other => panic!("expected NonJson, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_missing_data_is_empty() {
        let raw = r#"{"status": "success"}"#;
        let err = DhanClient::parse_body(&nifty(), expiry(), raw).unwrap_err();
        assert!(matches!(err, FetchError::EmptyData));
    }

    #[test]
    fn test_parse_empty_oc_is_empty() {
        let raw = r#"{"data": {"oc": {}}}"#;
        let err = DhanClient::parse_body(&nifty(), expiry(), raw).unwrap_err();
        assert!(matches!(err, FetchError::EmptyData));
    }

    #[test]
    fn test_parse_skips_bad_strike_keys() {
        let raw = r#"{"data": {"oc": {
            "not-a-number": {"ce": {"volume": 1}},
            "20000": {"ce": {"volume": 2}}
        }}}"#;
        let snapshot = DhanClient::parse_body(&nifty(), expiry(), raw).unwrap();
        assert_eq!(snapshot.strikes.len(), 1);
        assert!(snapshot.strikes.contains_key(&dec!(20000)));
    }

    #[test]
    fn test_parse_only_bad_strike_keys_is_empty() {
        let raw = r#"{"data": {"oc": {"garbage": {"ce": {"volume": 1}}}}}"#;
        let err = DhanClient::parse_body(&nifty(), expiry(), raw).unwrap_err();
        assert!(matches!(err, FetchError::EmptyData));
    }

    #[test]
    fn test_new_client() {
        let client = DhanClient::new("https://api.dhan.co", "client-123");
        assert!(client.is_ok());
    }
}
