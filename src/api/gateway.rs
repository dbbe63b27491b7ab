//! Gateway abstraction over the broker-copy provider.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{ConnectionState, CopierMode, CopierPatch, CopySettings, MemberSettings, RiskType};

use super::types::{AccountData, CopierData};

/// Why a remote call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The provider answered with a non-success status
    Rejected,
    /// The provider could not be reached or did not answer in time
    Unavailable,
}

/// Failure reported by, or on the way to, the remote provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Rejected,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Unavailable,
            message: message.into(),
        }
    }
}

/// Copier relationship state as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyLink {
    pub remote_copier_id: String,
    pub mode: CopierMode,
    pub risk_type: RiskType,
    pub risk_value: Decimal,
    pub settings: CopySettings,
}

impl CopyLink {
    /// Membership record backed by this copier state.
    pub fn member_settings(&self, is_lead_copy: bool) -> MemberSettings {
        MemberSettings {
            mode: self.mode,
            risk_type: self.risk_type,
            risk_value: self.risk_value,
            copy: self.settings.clone(),
            is_lead_copy,
        }
    }
}

impl From<CopierData> for CopyLink {
    fn from(data: CopierData) -> Self {
        CopyLink {
            remote_copier_id: data.id,
            mode: data.mode,
            risk_type: data.risk_type,
            risk_value: data.risk_value,
            settings: CopySettings {
                copy_take_profit: data.copy_tp,
                copy_stop_loss: data.copy_sl,
                max_lot: data.max_lot,
                force_min_lot: data.force_min,
                slippage: data.slippage,
                copy_pending_orders: data.copy_pending,
                reverse_direction: data.reverse,
            },
        }
    }
}

/// Trading-account state on the provider side.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAccount {
    pub remote_account_id: String,
    pub account_name: String,
    pub connection_state: ConnectionState,
}

impl From<AccountData> for RemoteAccount {
    fn from(data: AccountData) -> Self {
        RemoteAccount {
            connection_state: ConnectionState::from_wire(&data.status),
            remote_account_id: data.id,
            account_name: data.account_name,
        }
    }
}

/// Client over the provider's copier and account endpoints.
///
/// Pure request/response; the coordinator owns all local state and never
/// retries a failed call.
#[async_trait]
pub trait CopyGateway: Send + Sync {
    async fn create_copy_link(
        &self,
        lead_remote_id: &str,
        follower_remote_id: &str,
        risk_type: RiskType,
        risk_value: Decimal,
    ) -> Result<CopyLink, RemoteError>;

    async fn update_copy_link(
        &self,
        remote_copier_id: &str,
        patch: &CopierPatch,
    ) -> Result<CopyLink, RemoteError>;

    async fn delete_copy_link(&self, remote_copier_id: &str) -> Result<(), RemoteError>;

    async fn get_copy_link(&self, remote_copier_id: &str) -> Result<CopyLink, RemoteError>;

    async fn get_account(&self, remote_account_id: &str) -> Result<RemoteAccount, RemoteError>;

    async fn delete_account(&self, remote_account_id: &str) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_copy_link_from_wire_payload() {
        let data = CopierData {
            id: "cp-7".to_string(),
            mode: CopierMode::Monitor,
            risk_type: RiskType::LotMultiplier,
            risk_value: dec!(2),
            copy_tp: false,
            copy_sl: true,
            max_lot: dec!(5),
            force_min: dec!(0.1),
            slippage: dec!(10),
            copy_pending: true,
            reverse: true,
        };

        let link = CopyLink::from(data);
        assert_eq!(link.remote_copier_id, "cp-7");
        assert_eq!(link.mode, CopierMode::Monitor);
        assert_eq!(link.settings.max_lot, dec!(5));
        assert_eq!(link.settings.force_min_lot, dec!(0.1));
        assert!(link.settings.copy_pending_orders);
        assert!(link.settings.reverse_direction);
    }

    #[test]
    fn test_member_settings_carries_flag() {
        let data = CopierData {
            id: "cp-1".to_string(),
            mode: CopierMode::On,
            risk_type: RiskType::FixedLot,
            risk_value: dec!(0.5),
            copy_tp: true,
            copy_sl: true,
            max_lot: dec!(1),
            force_min: dec!(0.01),
            slippage: dec!(3),
            copy_pending: false,
            reverse: false,
        };
        let link = CopyLink::from(data);

        assert!(link.member_settings(true).is_lead_copy);
        assert!(!link.member_settings(false).is_lead_copy);
        assert_eq!(link.member_settings(false).risk_value, dec!(0.5));
    }

    #[test]
    fn test_remote_account_maps_unknown_status() {
        let data = AccountData {
            id: "100".to_string(),
            account_name: "Main".to_string(),
            status: "migrating".to_string(),
        };

        let account = RemoteAccount::from(data);
        assert_eq!(account.connection_state, ConnectionState::Unknown);
    }
}
