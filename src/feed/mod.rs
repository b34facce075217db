//! Option-chain feed integrations.
//!
//! Defines the `OptionChainSource` trait and the Dhan implementation.
//! Fetch failures are classified so the engine can tell a transient
//! upstream wobble (skip the instrument this cycle) from credential
//! expiry (clear the session and notify the operator).

pub mod dhan;

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;
use thiserror::Error;

use crate::types::{InstrumentSpec, OptionChainSnapshot};

/// Cap on raw upstream bodies retained inside errors. Enough to diagnose
/// contract drift without dragging whole HTML gateway pages through logs.
const RAW_BODY_LIMIT: usize = 2048;

/// Classified fetch failure.
///
/// Only `AuthExpired` escalates past the current cycle; everything else
/// is logged and the instrument is skipped.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure or request timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Body that is not JSON at all (gateway HTML page and the like).
    #[error("non-JSON response: {raw}")]
    NonJson { raw: String },

    /// Upstream returned an error status that is not an auth problem.
    #[error("upstream error {status}: {body}")]
    ServerError { status: u16, body: String },

    /// The credential was rejected; the session must be cleared.
    #[error("access token expired or rejected: {body}")]
    AuthExpired { body: String },

    /// Well-formed response with no usable strikes.
    #[error("no option-chain data returned")]
    EmptyData,
}

impl FetchError {
    /// Whether this failure should count towards per-instrument backoff.
    /// Empty data means the upstream is healthy, just uneventful.
    pub fn is_transient_failure(&self) -> bool {
        matches!(
            self,
            FetchError::Transport(_) | FetchError::NonJson { .. } | FetchError::ServerError { .. }
        )
    }
}

/// Truncate a raw upstream body for retention inside an error.
pub(crate) fn clip_raw(body: &str) -> String {
    if body.len() <= RAW_BODY_LIMIT {
        body.to_string()
    } else {
        let mut end = RAW_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}… [{} bytes total]", &body[..end], body.len())
    }
}

/// Abstraction over the upstream option-chain provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OptionChainSource: Send + Sync {
    /// Fetch and normalize the chain for one instrument at one expiry.
    async fn fetch(
        &self,
        instrument: &InstrumentSpec,
        credential: &SecretString,
        expiry: NaiveDate,
    ) -> Result<OptionChainSnapshot, FetchError>;
}
