//! Core coordinator for copy groups.
//!
//! Every mutation takes the per-key lock, validates against local state,
//! pushes the remote call first, and persists only what the provider
//! acknowledged. Multi-step operations (add, propagate, teardown) run
//! their remote calls sequentially and persist after each step, so a
//! mid-loop failure leaves exactly the completed steps in place and the
//! returned error says how many got through.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::api::CopyGateway;
use crate::db::{AccountRegistry, GroupStore};
use crate::error::{AccountSide, Error, Result};
use crate::models::{
    new_id, resolve_update, CopierPatch, CopyGroup, FollowerMembership, RiskType, TradingAccount,
};
use crate::notify::{EventKind, GroupEvent, NotificationSink};

use super::locks::GroupLocks;

/// Orchestrates copy groups across the registry, the group store and the
/// remote provider.
pub struct GroupCoordinator {
    gateway: Arc<dyn CopyGateway>,
    accounts: Arc<dyn AccountRegistry>,
    groups: Arc<dyn GroupStore>,
    notifier: Arc<dyn NotificationSink>,
    locks: GroupLocks,
}

impl GroupCoordinator {
    pub fn new(
        gateway: Arc<dyn CopyGateway>,
        accounts: Arc<dyn AccountRegistry>,
        groups: Arc<dyn GroupStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            gateway,
            accounts,
            groups,
            notifier,
            locks: GroupLocks::new(),
        }
    }

    // ==================== Group Operations ====================

    /// Create a new copy group from a lead account and its first follower.
    ///
    /// The provider is asked to link the pair before anything is stored;
    /// the group's canonical configuration is taken from its response, so
    /// the record mirrors what the provider actually applied.
    pub async fn create_group(
        &self,
        user_id: &str,
        lead_account_id: &str,
        follower_account_id: &str,
        risk_type: RiskType,
        risk_multiplier: Decimal,
    ) -> Result<CopyGroup> {
        if lead_account_id == follower_account_id {
            return Err(Error::SelfCopy);
        }
        if risk_multiplier <= Decimal::ZERO {
            return Err(Error::Validation("risk value must be positive".to_string()));
        }

        let _guard = self.locks.acquire(lead_account_id).await;

        if let Some(existing) = self.groups.find_by_lead(lead_account_id).await? {
            return Err(Error::DuplicateLead {
                lead_account_id: lead_account_id.to_string(),
                group_id: existing.id,
            });
        }

        let lead = self.resolve_account(lead_account_id, AccountSide::Lead).await?;
        let follower = self
            .resolve_account(follower_account_id, AccountSide::Follower)
            .await?;

        if let Some(other) = self.groups.find_with_follower(follower_account_id).await? {
            return Err(Error::AlreadyFollowing {
                account_id: follower_account_id.to_string(),
                group_id: other.id,
            });
        }

        let link = self
            .gateway
            .create_copy_link(
                &lead.remote_account_id,
                &follower.remote_account_id,
                risk_type,
                risk_multiplier,
            )
            .await
            .map_err(|e| Error::remote(e, 0))?;

        let now = Utc::now();
        let group = CopyGroup {
            id: new_id(),
            owner_user_id: user_id.to_string(),
            lead_account_id: lead_account_id.to_string(),
            risk_type: link.risk_type,
            risk_multiplier: link.risk_value,
            mode: link.mode,
            settings: link.settings.clone(),
            memberships: vec![FollowerMembership {
                follower_account_id: follower_account_id.to_string(),
                follower_display_name: follower.display_name,
                remote_copier_id: link.remote_copier_id.clone(),
                settings: link.member_settings(true),
            }],
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.groups.insert(&group).await?;

        info!(
            group = %group.id,
            lead = %lead_account_id,
            follower = %follower_account_id,
            copier = %link.remote_copier_id,
            "Created copy group"
        );
        self.notify(user_id, EventKind::GroupCreated, Some(&group.id)).await;

        Ok(group)
    }

    /// Add followers to an existing group, one provider call per id in
    /// input order. Returns how many were added.
    ///
    /// The loop stops at the first failure. Followers added before the
    /// failure stay added; the error reports the count that got through.
    pub async fn add_followers(
        &self,
        group_id: &str,
        follower_account_ids: &[String],
    ) -> Result<usize> {
        if follower_account_ids.is_empty() {
            return Err(Error::Validation("no follower accounts given".to_string()));
        }

        let _guard = self.locks.acquire(group_id).await;
        let mut group = self.load_group(group_id).await?;

        if follower_account_ids
            .iter()
            .any(|id| id == &group.lead_account_id)
        {
            return Err(Error::SelfCopy);
        }

        let lead = self
            .resolve_account(&group.lead_account_id, AccountSide::Lead)
            .await?;

        let mut added = 0;
        for follower_id in follower_account_ids {
            let follower = self
                .resolve_account(follower_id, AccountSide::Follower)
                .await?;

            if let Some(other) = self.groups.find_with_follower(follower_id).await? {
                return Err(Error::AlreadyFollowing {
                    account_id: follower_id.clone(),
                    group_id: other.id,
                });
            }

            let link = self
                .gateway
                .create_copy_link(
                    &lead.remote_account_id,
                    &follower.remote_account_id,
                    group.risk_type,
                    group.risk_multiplier,
                )
                .await
                .map_err(|e| {
                    warn!(
                        group = %group.id,
                        follower = %follower_id,
                        added = added,
                        error = %e,
                        "Provider refused follower; stopping"
                    );
                    Error::remote(e, added)
                })?;

            let settings = link.member_settings(false);
            group.memberships.push(FollowerMembership {
                follower_account_id: follower_id.clone(),
                follower_display_name: follower.display_name,
                remote_copier_id: link.remote_copier_id,
                settings,
            });
            self.groups.update(&mut group).await?;
            added += 1;
        }

        info!(group = %group.id, added = added, "Added followers to group");
        self.notify(&group.owner_user_id, EventKind::FollowersAdded, Some(&group.id))
            .await;

        Ok(added)
    }

    /// Propagate a settings patch to every membership in the group.
    ///
    /// Each membership's effective payload is the patch over its own
    /// stored record, so per-member overrides survive fields the patch
    /// does not touch. Memberships updated before a mid-loop failure
    /// stay updated.
    pub async fn update_group(&self, group_id: &str, patch: &CopierPatch) -> Result<CopyGroup> {
        if patch.is_empty() {
            return Err(Error::Validation("update patch is empty".to_string()));
        }

        let _guard = self.locks.acquire(group_id).await;
        let mut group = self.load_group(group_id).await?;

        let mut updated = 0;
        for i in 0..group.memberships.len() {
            let copier_id = group.memberships[i].remote_copier_id.clone();
            let is_lead_copy = group.memberships[i].settings.is_lead_copy;
            let payload = resolve_update(patch, &group.memberships[i].settings);

            let link = self
                .gateway
                .update_copy_link(&copier_id, &payload)
                .await
                .map_err(|e| {
                    warn!(
                        group = %group.id,
                        copier = %copier_id,
                        updated = updated,
                        error = %e,
                        "Provider refused update; stopping propagation"
                    );
                    Error::remote(e, updated)
                })?;

            group.memberships[i].settings = link.member_settings(is_lead_copy);
            if is_lead_copy {
                let canonical = group.memberships[i].settings.clone();
                group.set_canonical(&canonical);
            }
            self.groups.update(&mut group).await?;
            updated += 1;
        }

        info!(group = %group.id, members = updated, "Propagated group update");
        self.notify(&group.owner_user_id, EventKind::GroupUpdated, Some(&group.id))
            .await;

        Ok(group)
    }

    /// Apply a settings patch to a single membership.
    ///
    /// Patching the lead-copy membership is a global change: the group's
    /// canonical configuration is rewritten from the provider response as
    /// well, since that membership is its canonical holder.
    pub async fn update_membership(
        &self,
        group_id: &str,
        follower_account_id: &str,
        patch: &CopierPatch,
    ) -> Result<CopyGroup> {
        if patch.is_empty() {
            return Err(Error::Validation("update patch is empty".to_string()));
        }

        let _guard = self.locks.acquire(group_id).await;
        let mut group = self.load_group(group_id).await?;

        let idx = group
            .memberships
            .iter()
            .position(|m| m.follower_account_id == follower_account_id)
            .ok_or_else(|| Error::MembershipNotFound {
                group_id: group_id.to_string(),
                follower_account_id: follower_account_id.to_string(),
            })?;

        let is_lead_copy = group.memberships[idx].settings.is_lead_copy;
        let base = if is_lead_copy {
            group.canonical_settings()
        } else {
            group.memberships[idx].settings.clone()
        };
        let payload = resolve_update(patch, &base);
        let copier_id = group.memberships[idx].remote_copier_id.clone();

        let link = self
            .gateway
            .update_copy_link(&copier_id, &payload)
            .await
            .map_err(|e| Error::remote(e, 0))?;

        group.memberships[idx].settings = link.member_settings(is_lead_copy);
        if is_lead_copy {
            let canonical = group.memberships[idx].settings.clone();
            group.set_canonical(&canonical);
        }
        self.groups.update(&mut group).await?;

        info!(
            group = %group.id,
            follower = %follower_account_id,
            global = is_lead_copy,
            "Updated membership"
        );
        self.notify(
            &group.owner_user_id,
            EventKind::MembershipUpdated,
            Some(&group.id),
        )
        .await;

        Ok(group)
    }

    /// Remove one follower from a group.
    ///
    /// Removing the last membership deletes the group itself, returning
    /// `None`. Removing the lead-copy membership promotes the entry left
    /// at position 0 and makes its record the group canonical state.
    pub async fn remove_membership(
        &self,
        group_id: &str,
        follower_account_id: &str,
    ) -> Result<Option<CopyGroup>> {
        let _guard = self.locks.acquire(group_id).await;
        let mut group = self.load_group(group_id).await?;

        let copier_id = {
            let membership = group.find_follower(follower_account_id).ok_or_else(|| {
                Error::MembershipNotFound {
                    group_id: group_id.to_string(),
                    follower_account_id: follower_account_id.to_string(),
                }
            })?;
            membership.remote_copier_id.clone()
        };

        self.gateway
            .delete_copy_link(&copier_id)
            .await
            .map_err(|e| Error::remote(e, 0))?;

        if group.memberships.len() == 1 {
            self.groups.delete(&group).await?;
            info!(group = %group.id, "Removed last membership; group deleted");
            self.notify(&group.owner_user_id, EventKind::GroupDeleted, Some(&group.id))
                .await;
            return Ok(None);
        }

        group.remove_membership(follower_account_id);
        self.groups.update(&mut group).await?;

        info!(
            group = %group.id,
            follower = %follower_account_id,
            remaining = group.memberships.len(),
            "Removed membership from group"
        );
        self.notify(
            &group.owner_user_id,
            EventKind::MembershipRemoved,
            Some(&group.id),
        )
        .await;

        Ok(Some(group))
    }

    /// Tear down a whole group: remote links are deleted front-to-back,
    /// one at a time, and the record shrinks as links disappear. A
    /// mid-loop failure leaves the group holding exactly the memberships
    /// whose links still exist.
    pub async fn delete_group(&self, group_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(group_id).await;
        let mut group = self.load_group(group_id).await?;
        let owner = group.owner_user_id.clone();

        let mut removed = 0;
        while !group.memberships.is_empty() {
            let copier_id = group.memberships[0].remote_copier_id.clone();
            let follower_id = group.memberships[0].follower_account_id.clone();

            self.gateway
                .delete_copy_link(&copier_id)
                .await
                .map_err(|e| {
                    warn!(
                        group = %group.id,
                        copier = %copier_id,
                        removed = removed,
                        error = %e,
                        "Provider refused unlink; stopping teardown"
                    );
                    Error::remote(e, removed)
                })?;

            group.remove_membership(&follower_id);
            if group.memberships.is_empty() {
                self.groups.delete(&group).await?;
            } else {
                self.groups.update(&mut group).await?;
            }
            removed += 1;
        }

        info!(group = %group_id, members = removed, "Deleted copy group");
        self.notify(&owner, EventKind::GroupDeleted, Some(group_id)).await;

        Ok(())
    }

    // ==================== Account Operations ====================

    /// Delete a trading account, guarding the copy-group invariants.
    ///
    /// An account that follows in some group cannot be deleted. An
    /// account that leads a group takes the whole group down with it,
    /// through the same teardown path as `delete_group`.
    pub async fn delete_account(&self, account_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(account_id).await;

        let account = self.accounts.get(account_id).await?.ok_or_else(|| {
            Error::Validation(format!("no trading account with id {}", account_id))
        })?;

        if let Some(group) = self.groups.find_with_follower(account_id).await? {
            return Err(Error::StillCopied {
                account_id: account_id.to_string(),
                group_id: group.id,
            });
        }

        if let Some(group) = self.groups.find_by_lead(account_id).await? {
            self.delete_group(&group.id).await?;
        }

        if !account.remote_account_id.is_empty() {
            self.gateway
                .delete_account(&account.remote_account_id)
                .await
                .map_err(|e| Error::remote(e, 0))?;
        }

        self.accounts.delete(account_id).await?;

        info!(account = %account_id, "Deleted trading account");
        self.notify(&account.owner_user_id, EventKind::AccountDeleted, None)
            .await;

        Ok(())
    }

    // ==================== Queries ====================

    pub async fn get_group(&self, group_id: &str) -> Result<CopyGroup> {
        self.load_group(group_id).await
    }

    pub async fn list_groups(&self, user_id: &str) -> Result<Vec<CopyGroup>> {
        self.groups.list(user_id).await
    }

    // ==================== Internals ====================

    async fn load_group(&self, group_id: &str) -> Result<CopyGroup> {
        self.groups
            .get(group_id)
            .await?
            .ok_or_else(|| Error::GroupNotFound {
                group_id: group_id.to_string(),
            })
    }

    /// Look up an account and require a provider link on it.
    async fn resolve_account(
        &self,
        account_id: &str,
        side: AccountSide,
    ) -> Result<TradingAccount> {
        let account = self
            .accounts
            .get(account_id)
            .await?
            .ok_or_else(|| Error::AccountNotFound {
                side,
                account_id: account_id.to_string(),
            })?;

        if account.remote_account_id.is_empty() {
            return Err(Error::Validation(format!(
                "account {} has no linked provider account",
                account_id
            )));
        }

        Ok(account)
    }

    async fn notify(&self, user_id: &str, kind: EventKind, group_id: Option<&str>) {
        self.notifier
            .notify(GroupEvent::new(user_id, kind, group_id))
            .await;
    }
}
