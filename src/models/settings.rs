//! Risk and copy settings shared by groups and their memberships.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// How the provider sizes copied trades for a follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    RiskMultiplierByBalance,
    RiskMultiplierByEquity,
    RiskAmountPerTrade,
    LotMultiplier,
    FixedLot,
    PercentageRiskPerTradeByBalance,
    PercentageRiskPerTradeByEquity,
}

impl RiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::RiskMultiplierByBalance => "risk_multiplier_by_balance",
            RiskType::RiskMultiplierByEquity => "risk_multiplier_by_equity",
            RiskType::RiskAmountPerTrade => "risk_amount_per_trade",
            RiskType::LotMultiplier => "lot_multiplier",
            RiskType::FixedLot => "fixed_lot",
            RiskType::PercentageRiskPerTradeByBalance => "percentage_risk_per_trade_by_balance",
            RiskType::PercentageRiskPerTradeByEquity => "percentage_risk_per_trade_by_equity",
        }
    }
}

impl FromStr for RiskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "risk_multiplier_by_balance" => Ok(RiskType::RiskMultiplierByBalance),
            "risk_multiplier_by_equity" => Ok(RiskType::RiskMultiplierByEquity),
            "risk_amount_per_trade" => Ok(RiskType::RiskAmountPerTrade),
            "lot_multiplier" => Ok(RiskType::LotMultiplier),
            "fixed_lot" => Ok(RiskType::FixedLot),
            "percentage_risk_per_trade_by_balance" => Ok(RiskType::PercentageRiskPerTradeByBalance),
            "percentage_risk_per_trade_by_equity" => Ok(RiskType::PercentageRiskPerTradeByEquity),
            _ => Err(format!("unknown risk type '{}'", s)),
        }
    }
}

/// Whether the provider actively mirrors trades for a copier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopierMode {
    Off,
    On,
    Monitor,
}

impl CopierMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopierMode::Off => "off",
            CopierMode::On => "on",
            CopierMode::Monitor => "monitor",
        }
    }
}

impl FromStr for CopierMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(CopierMode::Off),
            "on" => Ok(CopierMode::On),
            "monitor" => Ok(CopierMode::Monitor),
            _ => Err(format!("unknown copier mode '{}'", s)),
        }
    }
}

/// Trade-copying behavior of one copier relationship.
///
/// The group holds one canonical record of these; every membership holds
/// its own, possibly overridden, record of the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopySettings {
    /// Mirror the lead's take-profit levels
    pub copy_take_profit: bool,

    /// Mirror the lead's stop-loss levels
    pub copy_stop_loss: bool,

    /// Largest lot the copier may open
    pub max_lot: Decimal,

    /// Floor applied when the computed lot is below the broker minimum
    pub force_min_lot: Decimal,

    /// Tolerated price deviation in points when mirroring
    pub slippage: Decimal,

    /// Mirror pending orders, not just market fills
    pub copy_pending_orders: bool,

    /// Open mirrored trades in the opposite direction
    pub reverse_direction: bool,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            copy_take_profit: true,
            copy_stop_loss: true,
            max_lot: dec!(100),
            force_min_lot: Decimal::ZERO,
            slippage: dec!(3),
            copy_pending_orders: false,
            reverse_direction: false,
        }
    }
}

/// Stored copier state of one membership.
///
/// `is_lead_copy` marks the single membership whose record doubles as the
/// group canonical configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSettings {
    pub mode: CopierMode,
    pub risk_type: RiskType,
    pub risk_value: Decimal,
    pub copy: CopySettings,
    pub is_lead_copy: bool,
}

/// Partial copier update; unset fields keep their stored values.
///
/// Doubles as the PATCH body sent to the provider, which is why the field
/// names serialize to the provider's short forms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopierPatch {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mode: Option<CopierMode>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub risk_type: Option<RiskType>,

    #[serde(
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub risk_value: Option<Decimal>,

    #[serde(rename = "copy_tp", skip_serializing_if = "Option::is_none", default)]
    pub copy_take_profit: Option<bool>,

    #[serde(rename = "copy_sl", skip_serializing_if = "Option::is_none", default)]
    pub copy_stop_loss: Option<bool>,

    #[serde(
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub max_lot: Option<Decimal>,

    #[serde(
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub slippage: Option<Decimal>,

    #[serde(
        rename = "force_min",
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub force_min_lot: Option<Decimal>,
}

impl CopierPatch {
    /// A patch with no fields set; resolving it yields the base unchanged.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.risk_type.is_none()
            && self.risk_value.is_none()
            && self.copy_take_profit.is_none()
            && self.copy_stop_loss.is_none()
            && self.max_lot.is_none()
            && self.slippage.is_none()
            && self.force_min_lot.is_none()
    }
}

/// Full update payload for one membership's remote copier, resolved field
/// by field: a value carried by the patch wins over the stored record.
///
/// Callers pass the membership's own settings as the base, or the group
/// canonical record when the membership is the lead copy, so the override
/// chain is request value, then member-stored value, then group canonical.
pub fn resolve_update(patch: &CopierPatch, base: &MemberSettings) -> CopierPatch {
    CopierPatch {
        mode: Some(patch.mode.unwrap_or(base.mode)),
        risk_type: Some(patch.risk_type.unwrap_or(base.risk_type)),
        risk_value: Some(patch.risk_value.unwrap_or(base.risk_value)),
        copy_take_profit: Some(patch.copy_take_profit.unwrap_or(base.copy.copy_take_profit)),
        copy_stop_loss: Some(patch.copy_stop_loss.unwrap_or(base.copy.copy_stop_loss)),
        max_lot: Some(patch.max_lot.unwrap_or(base.copy.max_lot)),
        slippage: Some(patch.slippage.unwrap_or(base.copy.slippage)),
        force_min_lot: Some(patch.force_min_lot.unwrap_or(base.copy.force_min_lot)),
    }
}
