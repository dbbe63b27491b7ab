//! Copy-group aggregate: one lead account plus its ordered memberships.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::settings::{CopierMode, CopySettings, MemberSettings, RiskType};

/// One follower's participation in a copy group.
///
/// Embedded in the group record, not an aggregate of its own; the position
/// in the group's sequence is part of the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerMembership {
    pub follower_account_id: String,
    pub follower_display_name: String,

    /// Id of the copier relationship on the external provider
    pub remote_copier_id: String,

    pub settings: MemberSettings,
}

/// A lead account and every account copying it.
///
/// The membership sequence is ordered: exactly one entry carries
/// `settings.is_lead_copy == true`, kept at position 0, and its record
/// mirrors the group canonical fields below. A group never exists with an
/// empty membership sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyGroup {
    pub id: String,
    pub owner_user_id: String,

    /// Exactly one group may exist per lead account
    pub lead_account_id: String,

    /// Canonical risk configuration, mirrored by the lead-copy membership
    pub risk_type: RiskType,
    pub risk_multiplier: Decimal,
    pub mode: CopierMode,

    /// Canonical copy settings, mirrored by the lead-copy membership
    pub settings: CopySettings,

    pub memberships: Vec<FollowerMembership>,

    /// Store-managed counter for compare-and-swap writes
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CopyGroup {
    /// The membership holding the canonical configuration.
    pub fn lead_copy(&self) -> Option<&FollowerMembership> {
        self.memberships.iter().find(|m| m.settings.is_lead_copy)
    }

    pub fn find_follower(&self, follower_account_id: &str) -> Option<&FollowerMembership> {
        self.memberships
            .iter()
            .find(|m| m.follower_account_id == follower_account_id)
    }

    pub fn contains_follower(&self, follower_account_id: &str) -> bool {
        self.find_follower(follower_account_id).is_some()
    }

    /// The canonical configuration viewed as a membership record.
    pub fn canonical_settings(&self) -> MemberSettings {
        MemberSettings {
            mode: self.mode,
            risk_type: self.risk_type,
            risk_value: self.risk_multiplier,
            copy: self.settings.clone(),
            is_lead_copy: true,
        }
    }

    /// Overwrite the canonical fields from a membership record.
    pub fn set_canonical(&mut self, settings: &MemberSettings) {
        self.mode = settings.mode;
        self.risk_type = settings.risk_type;
        self.risk_multiplier = settings.risk_value;
        self.settings = settings.copy.clone();
    }

    /// Remove one membership by follower account id.
    ///
    /// When the removed entry carried the lead-copy flag and other
    /// memberships remain, the entry now at position 0 is promoted: it
    /// takes the flag and its record becomes the group canonical state.
    pub fn remove_membership(&mut self, follower_account_id: &str) -> Option<FollowerMembership> {
        let idx = self
            .memberships
            .iter()
            .position(|m| m.follower_account_id == follower_account_id)?;
        let removed = self.memberships.remove(idx);

        if removed.settings.is_lead_copy && !self.memberships.is_empty() {
            self.memberships[0].settings.is_lead_copy = true;
            let promoted = self.memberships[0].settings.clone();
            self.set_canonical(&promoted);
        }

        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn member(account_id: &str, copier_id: &str, is_lead_copy: bool) -> FollowerMembership {
        FollowerMembership {
            follower_account_id: account_id.to_string(),
            follower_display_name: format!("Account {}", account_id),
            remote_copier_id: copier_id.to_string(),
            settings: MemberSettings {
                mode: CopierMode::On,
                risk_type: RiskType::LotMultiplier,
                risk_value: dec!(1),
                copy: CopySettings::default(),
                is_lead_copy,
            },
        }
    }

    fn sample_group() -> CopyGroup {
        let now = Utc::now();
        CopyGroup {
            id: "grp-1".to_string(),
            owner_user_id: "user-1".to_string(),
            lead_account_id: "acc-lead".to_string(),
            risk_type: RiskType::LotMultiplier,
            risk_multiplier: dec!(1),
            mode: CopierMode::On,
            settings: CopySettings::default(),
            memberships: vec![member("acc-f1", "cp-1", true), member("acc-f2", "cp-2", false)],
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_lead_copy_lookup() {
        let group = sample_group();
        assert_eq!(group.lead_copy().unwrap().follower_account_id, "acc-f1");
        assert!(group.contains_follower("acc-f2"));
        assert!(!group.contains_follower("acc-f9"));
    }

    #[test]
    fn test_canonical_settings_mirror() {
        let group = sample_group();
        let canonical = group.canonical_settings();

        assert_eq!(canonical.mode, group.mode);
        assert_eq!(canonical.risk_type, group.risk_type);
        assert_eq!(canonical.risk_value, group.risk_multiplier);
        assert_eq!(canonical.copy, group.settings);
        assert!(canonical.is_lead_copy);
    }

    #[test]
    fn test_remove_membership_plain() {
        let mut group = sample_group();
        let removed = group.remove_membership("acc-f2").unwrap();

        assert_eq!(removed.remote_copier_id, "cp-2");
        assert_eq!(group.memberships.len(), 1);
        assert!(group.memberships[0].settings.is_lead_copy);
    }

    #[test]
    fn test_remove_lead_copy_promotes_position_zero() {
        let mut group = sample_group();
        // Differentiate the second membership so promotion is observable
        group.memberships[1].settings.risk_value = dec!(2.5);
        group.memberships[1].settings.mode = CopierMode::Monitor;
        group.memberships[1].settings.copy.slippage = dec!(7);
        let prior = group.memberships[1].settings.clone();

        let removed = group.remove_membership("acc-f1").unwrap();
        assert!(removed.settings.is_lead_copy);

        assert_eq!(group.memberships.len(), 1);
        let promoted = &group.memberships[0];
        assert_eq!(promoted.follower_account_id, "acc-f2");
        assert!(promoted.settings.is_lead_copy);

        // Canonical fields now equal the promoted membership's prior record
        assert_eq!(group.risk_multiplier, prior.risk_value);
        assert_eq!(group.mode, prior.mode);
        assert_eq!(group.settings, prior.copy);
    }

    #[test]
    fn test_remove_last_membership_leaves_empty_sequence() {
        let mut group = sample_group();
        group.remove_membership("acc-f2").unwrap();
        group.remove_membership("acc-f1").unwrap();

        // The caller is responsible for deleting the group record itself
        assert!(group.memberships.is_empty());
    }

    #[test]
    fn test_remove_membership_unknown_id() {
        let mut group = sample_group();
        assert!(group.remove_membership("acc-f9").is_none());
        assert_eq!(group.memberships.len(), 2);
    }

    #[test]
    fn test_group_json_round_trip() {
        let group = sample_group();
        let body = serde_json::to_string(&group).unwrap();
        let decoded: CopyGroup = serde_json::from_str(&body).unwrap();

        assert_eq!(decoded, group);
    }
}
