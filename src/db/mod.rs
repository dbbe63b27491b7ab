//! SQLite persistence for the account registry and the copy-group store.
//!
//! Groups are stored whole: the membership sequence and canonical settings
//! serialize into one JSON body column, read-modify-written as a unit.
//! Queryable keys (lead account, owner) and the compare-and-swap version
//! counter live in their own columns next to it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::{Error, Result};
use crate::models::{ConnectionState, CopyGroup, TradingAccount};

/// Contract the coordinator needs from the trading-account registry.
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    async fn insert(&self, account: &TradingAccount) -> Result<()>;
    async fn get(&self, account_id: &str) -> Result<Option<TradingAccount>>;
    async fn exists(&self, account_id: &str) -> Result<bool>;
    async fn delete(&self, account_id: &str) -> Result<()>;
    async fn list(&self, owner_user_id: &str) -> Result<Vec<TradingAccount>>;
    async fn update_connection_state(&self, account_id: &str, state: ConnectionState)
        -> Result<()>;
}

/// Persistence contract for copy groups.
///
/// `update` and `delete` are compare-and-swap on the group's version: a
/// write against a version that is no longer current fails with
/// `ConcurrencyConflict` instead of clobbering a concurrent writer.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn insert(&self, group: &CopyGroup) -> Result<()>;
    async fn get(&self, group_id: &str) -> Result<Option<CopyGroup>>;
    async fn find_by_lead(&self, lead_account_id: &str) -> Result<Option<CopyGroup>>;
    async fn find_with_follower(&self, follower_account_id: &str) -> Result<Option<CopyGroup>>;
    /// Write the group back; on success the version in `group` is bumped
    /// to the stored one.
    async fn update(&self, group: &mut CopyGroup) -> Result<()>;
    async fn delete(&self, group: &CopyGroup) -> Result<()>;
    async fn list(&self, owner_user_id: &str) -> Result<Vec<CopyGroup>>;
}

/// Database connection pool backing both stores.
pub struct Database {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct AccountRow {
    id: String,
    owner_user_id: String,
    remote_account_id: String,
    display_name: String,
    broker_id: String,
    connection_state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for TradingAccount {
    fn from(row: AccountRow) -> Self {
        TradingAccount {
            id: row.id,
            owner_user_id: row.owner_user_id,
            remote_account_id: row.remote_account_id,
            display_name: row.display_name,
            broker_id: row.broker_id,
            connection_state: ConnectionState::from_wire(&row.connection_state),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct GroupRow {
    body: String,
    version: i64,
    updated_at: DateTime<Utc>,
}

fn decode_group(row: GroupRow) -> Result<CopyGroup> {
    let mut group: CopyGroup = serde_json::from_str(&row.body)?;
    group.version = row.version;
    group.updated_at = row.updated_at;
    Ok(group)
}

impl Database {
    /// Open (or create) the database and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// In-memory database for tests. The pool is pinned to one connection:
    /// each extra `sqlite::memory:` connection would see its own empty
    /// database.
    #[cfg(test)]
    pub(crate) async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trading_accounts (
                id TEXT PRIMARY KEY,
                owner_user_id TEXT NOT NULL,
                remote_account_id TEXT NOT NULL,
                display_name TEXT NOT NULL DEFAULT '',
                broker_id TEXT NOT NULL DEFAULT '',
                connection_state TEXT NOT NULL DEFAULT 'unknown',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS copy_groups (
                id TEXT PRIMARY KEY,
                owner_user_id TEXT NOT NULL,
                lead_account_id TEXT NOT NULL,
                body TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One group per lead account, enforced at the storage layer as well
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_copy_groups_lead ON copy_groups(lead_account_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_copy_groups_owner ON copy_groups(owner_user_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trading_accounts_owner ON trading_accounts(owner_user_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the connection pool (for advanced queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ==================== Account Registry ====================

#[async_trait]
impl AccountRegistry for Database {
    async fn insert(&self, account: &TradingAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trading_accounts
                (id, owner_user_id, remote_account_id, display_name, broker_id,
                 connection_state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.owner_user_id)
        .bind(&account.remote_account_id)
        .bind(&account.display_name)
        .bind(&account.broker_id)
        .bind(account.connection_state.as_str())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, account_id: &str) -> Result<Option<TradingAccount>> {
        let row: Option<AccountRow> =
            sqlx::query_as("SELECT * FROM trading_accounts WHERE id = ?")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(TradingAccount::from))
    }

    async fn exists(&self, account_id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM trading_accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn delete(&self, account_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM trading_accounts WHERE id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self, owner_user_id: &str) -> Result<Vec<TradingAccount>> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            "SELECT * FROM trading_accounts WHERE owner_user_id = ? ORDER BY created_at",
        )
        .bind(owner_user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TradingAccount::from).collect())
    }

    async fn update_connection_state(
        &self,
        account_id: &str,
        state: ConnectionState,
    ) -> Result<()> {
        sqlx::query("UPDATE trading_accounts SET connection_state = ?, updated_at = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(Utc::now())
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ==================== Copy Group Store ====================

#[async_trait]
impl GroupStore for Database {
    async fn insert(&self, group: &CopyGroup) -> Result<()> {
        let body = serde_json::to_string(group)?;

        sqlx::query(
            r#"
            INSERT INTO copy_groups
                (id, owner_user_id, lead_account_id, body, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&group.id)
        .bind(&group.owner_user_id)
        .bind(&group.lead_account_id)
        .bind(&body)
        .bind(group.version)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, group_id: &str) -> Result<Option<CopyGroup>> {
        let row: Option<GroupRow> =
            sqlx::query_as("SELECT body, version, updated_at FROM copy_groups WHERE id = ?")
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(decode_group).transpose()
    }

    async fn find_by_lead(&self, lead_account_id: &str) -> Result<Option<CopyGroup>> {
        let row: Option<GroupRow> = sqlx::query_as(
            "SELECT body, version, updated_at FROM copy_groups WHERE lead_account_id = ?",
        )
        .bind(lead_account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_group).transpose()
    }

    async fn find_with_follower(&self, follower_account_id: &str) -> Result<Option<CopyGroup>> {
        let rows: Vec<GroupRow> =
            sqlx::query_as("SELECT body, version, updated_at FROM copy_groups")
                .fetch_all(&self.pool)
                .await?;

        for row in rows {
            let group = decode_group(row)?;
            if group.contains_follower(follower_account_id) {
                return Ok(Some(group));
            }
        }

        Ok(None)
    }

    async fn update(&self, group: &mut CopyGroup) -> Result<()> {
        let mut next = group.clone();
        next.version = group.version + 1;
        next.updated_at = Utc::now();
        let body = serde_json::to_string(&next)?;

        let result = sqlx::query(
            "UPDATE copy_groups SET body = ?, version = ?, updated_at = ? WHERE id = ? AND version = ?",
        )
        .bind(&body)
        .bind(next.version)
        .bind(next.updated_at)
        .bind(&group.id)
        .bind(group.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ConcurrencyConflict {
                group_id: group.id.clone(),
            });
        }

        *group = next;
        Ok(())
    }

    async fn delete(&self, group: &CopyGroup) -> Result<()> {
        let result = sqlx::query("DELETE FROM copy_groups WHERE id = ? AND version = ?")
            .bind(&group.id)
            .bind(group.version)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ConcurrencyConflict {
                group_id: group.id.clone(),
            });
        }

        Ok(())
    }

    async fn list(&self, owner_user_id: &str) -> Result<Vec<CopyGroup>> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            "SELECT body, version, updated_at FROM copy_groups WHERE owner_user_id = ? ORDER BY created_at",
        )
        .bind(owner_user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_group).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::models::{
        CopierMode, CopySettings, FollowerMembership, MemberSettings, RiskType,
    };

    fn account(id: &str, owner: &str, remote: &str) -> TradingAccount {
        let now = Utc::now();
        TradingAccount {
            id: id.to_string(),
            owner_user_id: owner.to_string(),
            remote_account_id: remote.to_string(),
            display_name: format!("Account {}", id),
            broker_id: "broker-1".to_string(),
            connection_state: ConnectionState::ConnectionOk,
            created_at: now,
            updated_at: now,
        }
    }

    fn membership(account_id: &str, copier_id: &str, is_lead_copy: bool) -> FollowerMembership {
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

    fn group(id: &str, owner: &str, lead: &str, followers: &[(&str, &str)]) -> CopyGroup {
        let now = Utc::now();
        let memberships = followers
            .iter()
            .enumerate()
            .map(|(i, (account_id, copier_id))| membership(account_id, copier_id, i == 0))
            .collect();

        CopyGroup {
            id: id.to_string(),
            owner_user_id: owner.to_string(),
            lead_account_id: lead.to_string(),
            risk_type: RiskType::LotMultiplier,
            risk_multiplier: dec!(1),
            mode: CopierMode::On,
            settings: CopySettings::default(),
            memberships,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_account_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let registry: &dyn AccountRegistry = &db;

        let account = account("acc-1", "user-1", "100");
        registry.insert(&account).await.unwrap();

        let loaded = registry.get("acc-1").await.unwrap().unwrap();
        assert_eq!(loaded.remote_account_id, "100");
        assert_eq!(loaded.connection_state, ConnectionState::ConnectionOk);

        assert!(registry.exists("acc-1").await.unwrap());
        assert!(!registry.exists("acc-9").await.unwrap());
        assert!(registry.get("acc-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_account_delete() {
        let db = Database::in_memory().await.unwrap();
        let registry: &dyn AccountRegistry = &db;

        registry.insert(&account("acc-1", "user-1", "100")).await.unwrap();
        registry.delete("acc-1").await.unwrap();

        assert!(!registry.exists("acc-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_account_connection_state_update() {
        let db = Database::in_memory().await.unwrap();
        let registry: &dyn AccountRegistry = &db;

        registry.insert(&account("acc-1", "user-1", "100")).await.unwrap();
        registry
            .update_connection_state("acc-1", ConnectionState::ConnectionLost)
            .await
            .unwrap();

        let loaded = registry.get("acc-1").await.unwrap().unwrap();
        assert_eq!(loaded.connection_state, ConnectionState::ConnectionLost);
    }

    #[tokio::test]
    async fn test_account_list_by_owner() {
        let db = Database::in_memory().await.unwrap();
        let registry: &dyn AccountRegistry = &db;

        registry.insert(&account("acc-1", "user-1", "100")).await.unwrap();
        registry.insert(&account("acc-2", "user-1", "200")).await.unwrap();
        registry.insert(&account("acc-3", "user-2", "300")).await.unwrap();

        let accounts = registry.list("user-1").await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.owner_user_id == "user-1"));
    }

    #[tokio::test]
    async fn test_group_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let store: &dyn GroupStore = &db;

        let group = group("grp-1", "user-1", "acc-lead", &[("acc-f1", "cp-1")]);
        store.insert(&group).await.unwrap();

        let loaded = store.get("grp-1").await.unwrap().unwrap();
        assert_eq!(loaded.id, group.id);
        assert_eq!(loaded.lead_account_id, "acc-lead");
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.risk_type, RiskType::LotMultiplier);
        assert_eq!(loaded.settings, group.settings);
        assert_eq!(loaded.memberships, group.memberships);
        assert!(loaded.memberships[0].settings.is_lead_copy);

        assert!(store.get("grp-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_lead() {
        let db = Database::in_memory().await.unwrap();
        let store: &dyn GroupStore = &db;

        store
            .insert(&group("grp-1", "user-1", "acc-lead", &[("acc-f1", "cp-1")]))
            .await
            .unwrap();

        let found = store.find_by_lead("acc-lead").await.unwrap().unwrap();
        assert_eq!(found.id, "grp-1");
        assert!(store.find_by_lead("acc-other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_with_follower_scans_memberships() {
        let db = Database::in_memory().await.unwrap();
        let store: &dyn GroupStore = &db;

        store
            .insert(&group(
                "grp-1",
                "user-1",
                "acc-lead",
                &[("acc-f1", "cp-1"), ("acc-f2", "cp-2")],
            ))
            .await
            .unwrap();

        let found = store.find_with_follower("acc-f2").await.unwrap().unwrap();
        assert_eq!(found.id, "grp-1");
        assert!(store.find_with_follower("acc-f9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let db = Database::in_memory().await.unwrap();
        let store: &dyn GroupStore = &db;

        store
            .insert(&group("grp-1", "user-1", "acc-lead", &[("acc-f1", "cp-1")]))
            .await
            .unwrap();

        let mut loaded = store.get("grp-1").await.unwrap().unwrap();
        loaded.memberships.push(membership("acc-f2", "cp-2", false));
        store.update(&mut loaded).await.unwrap();
        assert_eq!(loaded.version, 2);

        let reloaded = store.get("grp-1").await.unwrap().unwrap();
        assert_eq!(reloaded.version, 2);
        assert_eq!(reloaded.memberships.len(), 2);
    }

    #[tokio::test]
    async fn test_update_stale_version_conflicts() {
        let db = Database::in_memory().await.unwrap();
        let store: &dyn GroupStore = &db;

        store
            .insert(&group("grp-1", "user-1", "acc-lead", &[("acc-f1", "cp-1")]))
            .await
            .unwrap();

        let mut first = store.get("grp-1").await.unwrap().unwrap();
        let mut second = store.get("grp-1").await.unwrap().unwrap();

        first.risk_multiplier = dec!(2);
        store.update(&mut first).await.unwrap();

        second.risk_multiplier = dec!(3);
        let err = store.update(&mut second).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrencyConflict { .. }));

        // The stale writer lost; the first write is still in place
        let reloaded = store.get("grp-1").await.unwrap().unwrap();
        assert_eq!(reloaded.risk_multiplier, dec!(2));
    }

    #[tokio::test]
    async fn test_delete_group_cas() {
        let db = Database::in_memory().await.unwrap();
        let store: &dyn GroupStore = &db;

        store
            .insert(&group("grp-1", "user-1", "acc-lead", &[("acc-f1", "cp-1")]))
            .await
            .unwrap();

        let stale = store.get("grp-1").await.unwrap().unwrap();
        let mut current = store.get("grp-1").await.unwrap().unwrap();
        store.update(&mut current).await.unwrap();

        let err = store.delete(&stale).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrencyConflict { .. }));

        store.delete(&current).await.unwrap();
        assert!(store.get("grp-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_groups_by_owner() {
        let db = Database::in_memory().await.unwrap();
        let store: &dyn GroupStore = &db;

        store
            .insert(&group("grp-1", "user-1", "acc-a", &[("acc-f1", "cp-1")]))
            .await
            .unwrap();
        store
            .insert(&group("grp-2", "user-2", "acc-b", &[("acc-f2", "cp-2")]))
            .await
            .unwrap();

        let groups = store.list("user-1").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, "grp-1");
    }

    #[tokio::test]
    async fn test_unique_lead_index() {
        let db = Database::in_memory().await.unwrap();
        let store: &dyn GroupStore = &db;

        store
            .insert(&group("grp-1", "user-1", "acc-lead", &[("acc-f1", "cp-1")]))
            .await
            .unwrap();

        let err = store
            .insert(&group("grp-2", "user-1", "acc-lead", &[("acc-f2", "cp-2")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
