//! Wire types for the broker-copy provider API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{CopierMode, RiskType};

use super::gateway::RemoteError;

/// Envelope wrapping every provider reply.
///
/// The provider reports success through `status`, not the HTTP status
/// line; `data` is null on failures and on delete acknowledgements.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: i64,
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.status == 200 || self.status == 201
    }

    /// Unwrap the payload, or surface the provider's message verbatim.
    pub fn into_result(self) -> Result<T, RemoteError> {
        if !self.is_success() {
            return Err(RemoteError::rejected(self.message));
        }
        self.data
            .ok_or_else(|| RemoteError::rejected("provider returned an empty payload"))
    }
}

/// Copier relationship payload as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopierData {
    pub id: String,
    pub mode: CopierMode,
    pub risk_type: RiskType,
    #[serde(with = "rust_decimal::serde::str")]
    pub risk_value: Decimal,
    pub copy_tp: bool,
    pub copy_sl: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_lot: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub force_min: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub slippage: Decimal,
    pub copy_pending: bool,
    pub reverse: bool,
}

/// Body for creating a new copier relationship.
#[derive(Debug, Clone, Serialize)]
pub struct CreateCopierRequest {
    pub lead_id: String,
    pub follower_id: String,
    pub risk_type: RiskType,
    #[serde(with = "rust_decimal::serde::str")]
    pub risk_value: Decimal,
}

/// Trading-account payload as the provider reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountData {
    pub id: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub status: String,
}
