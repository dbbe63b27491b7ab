//! Copy-trading group coordinator.
//!
//! Manages lead/follower copy groups against an external broker-copy
//! provider: linked trading accounts, ordered group memberships, and
//! propagation of risk settings across every copier link.

mod api;
mod config;
mod coordinator;
mod db;
mod error;
mod models;
mod notify;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{CopyGateway, ProviderClient};
use crate::config::ProviderConfig;
use crate::coordinator::GroupCoordinator;
use crate::db::{AccountRegistry, Database};
use crate::models::{new_id, CopierMode, CopierPatch, RiskType, TradingAccount};
use crate::notify::TracingNotifier;

/// Copy-trading group coordinator CLI.
#[derive(Parser)]
#[command(name = "groupcopier")]
#[command(about = "Manage lead/follower copy groups on the broker-copy provider", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(
        short,
        long,
        env = "COPIER_DATABASE_URL",
        default_value = "sqlite:./groupcopier.db?mode=rwc"
    )]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// User the operations act for
    #[arg(short, long, env = "COPIER_USER", default_value = "default")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a provider account so it can join copy groups
    Link {
        /// Account id on the provider side
        remote_id: String,

        /// Display name (defaults to the provider's account name)
        #[arg(short, long, default_value = "")]
        name: String,

        /// Broker identifier
        #[arg(short, long, default_value = "")]
        broker: String,
    },

    /// List linked trading accounts with their connection state
    Accounts,

    /// Delete a trading account (tears down its lead group first)
    DeleteAccount {
        /// Account id
        account_id: String,
    },

    /// Create a copy group from a lead account and its first follower
    Create {
        /// Lead account id
        lead: String,

        /// First follower account id
        follower: String,

        /// Risk type (e.g. lot_multiplier, fixed_lot)
        #[arg(short, long, default_value = "lot_multiplier")]
        risk_type: String,

        /// Risk value
        #[arg(short = 'v', long, default_value = "1")]
        risk_value: Decimal,
    },

    /// Add followers to an existing group, in copy order
    Add {
        /// Group id
        group_id: String,

        /// Follower account ids
        followers: Vec<String>,
    },

    /// Push a settings update to every membership in a group
    Update {
        /// Group id
        group_id: String,

        #[command(flatten)]
        patch: PatchArgs,
    },

    /// Push a settings update to a single membership
    UpdateMember {
        /// Group id
        group_id: String,

        /// Follower account id
        follower: String,

        #[command(flatten)]
        patch: PatchArgs,
    },

    /// Remove one follower from a group
    Remove {
        /// Group id
        group_id: String,

        /// Follower account id
        follower: String,
    },

    /// Delete a group, unlinking every follower on the provider
    Delete {
        /// Group id
        group_id: String,
    },

    /// Show a group and its memberships
    Show {
        /// Group id
        group_id: String,
    },

    /// List copy groups
    Groups,
}

/// Copier settings flags shared by the update commands.
#[derive(Args)]
struct PatchArgs {
    /// Copier mode (off, on, monitor)
    #[arg(long)]
    mode: Option<String>,

    /// Risk type
    #[arg(long)]
    risk_type: Option<String>,

    /// Risk value
    #[arg(long)]
    risk_value: Option<Decimal>,

    /// Mirror take-profit levels (true/false)
    #[arg(long)]
    copy_tp: Option<bool>,

    /// Mirror stop-loss levels (true/false)
    #[arg(long)]
    copy_sl: Option<bool>,

    /// Largest lot the copier may open
    #[arg(long)]
    max_lot: Option<Decimal>,

    /// Tolerated price deviation in points
    #[arg(long)]
    slippage: Option<Decimal>,

    /// Minimum-lot floor
    #[arg(long)]
    force_min: Option<Decimal>,
}

impl PatchArgs {
    fn into_patch(self) -> Result<CopierPatch> {
        Ok(CopierPatch {
            mode: self
                .mode
                .as_deref()
                .map(CopierMode::from_str)
                .transpose()
                .map_err(anyhow::Error::msg)?,
            risk_type: self
                .risk_type
                .as_deref()
                .map(RiskType::from_str)
                .transpose()
                .map_err(anyhow::Error::msg)?,
            risk_value: self.risk_value,
            copy_take_profit: self.copy_tp,
            copy_stop_loss: self.copy_sl,
            max_lot: self.max_lot,
            slippage: self.slippage,
            force_min_lot: self.force_min,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize database and provider client
    let db = Arc::new(Database::new(&cli.database).await?);
    let provider = Arc::new(ProviderClient::new(&ProviderConfig::from_env()?)?);

    let registry: Arc<dyn AccountRegistry> = db.clone();
    let coordinator = GroupCoordinator::new(
        provider.clone(),
        db.clone(),
        db.clone(),
        Arc::new(TracingNotifier),
    );

    match cli.command {
        Commands::Link {
            remote_id,
            name,
            broker,
        } => {
            info!(remote = %remote_id, "Linking provider account");

            // The account must already exist on the provider side
            let remote = provider
                .get_account(&remote_id)
                .await
                .with_context(|| format!("account {} not available on the provider", remote_id))?;

            let display_name = if !name.is_empty() {
                name
            } else if !remote.account_name.is_empty() {
                remote.account_name
            } else {
                format!("Account {}", remote_id)
            };

            let now = Utc::now();
            let account = TradingAccount {
                id: new_id(),
                owner_user_id: cli.user.clone(),
                remote_account_id: remote_id.clone(),
                display_name,
                broker_id: broker,
                connection_state: remote.connection_state,
                created_at: now,
                updated_at: now,
            };
            registry.insert(&account).await?;

            println!(
                "Linked account {} (remote {}, state {})",
                account.id, remote_id, account.connection_state
            );
        }

        Commands::Accounts => {
            let accounts = registry.list(&cli.user).await?;

            if accounts.is_empty() {
                println!("No linked accounts. Use 'groupcopier link <remote-id>' to add one.");
                return Ok(());
            }

            println!(
                "\n{:<12} {:<12} {:<24} {:<12} {}",
                "ID", "REMOTE", "NAME", "BROKER", "STATE"
            );
            println!("{}", "-".repeat(78));

            for account in accounts {
                // Refresh the connection state from the provider; keep the
                // stored state when the provider cannot be reached
                let state = match provider.get_account(&account.remote_account_id).await {
                    Ok(remote) => {
                        if remote.connection_state != account.connection_state {
                            registry
                                .update_connection_state(&account.id, remote.connection_state)
                                .await?;
                        }
                        remote.connection_state
                    }
                    Err(e) => {
                        warn!(account = %account.id, error = %e, "Could not refresh connection state");
                        account.connection_state
                    }
                };

                println!(
                    "{:<12} {:<12} {:<24} {:<12} {}",
                    account.id,
                    account.remote_account_id,
                    truncate(&account.display_name, 22),
                    account.broker_id,
                    state
                );
            }
        }

        Commands::DeleteAccount { account_id } => {
            coordinator.delete_account(&account_id).await?;
            println!("Deleted account {}", account_id);
        }

        Commands::Create {
            lead,
            follower,
            risk_type,
            risk_value,
        } => {
            let risk_type = risk_type.parse::<RiskType>().map_err(anyhow::Error::msg)?;
            info!(lead = %lead, follower = %follower, "Creating copy group");

            let group = coordinator
                .create_group(&cli.user, &lead, &follower, risk_type, risk_value)
                .await?;

            println!(
                "Created group {} (lead {}, risk {} x {})",
                group.id,
                group.lead_account_id,
                group.risk_type.as_str(),
                group.risk_multiplier
            );
        }

        Commands::Add { group_id, followers } => {
            let added = coordinator.add_followers(&group_id, &followers).await?;
            println!("Added {} follower(s) to group {}", added, group_id);
        }

        Commands::Update { group_id, patch } => {
            let patch = patch.into_patch()?;
            let group = coordinator.update_group(&group_id, &patch).await?;
            println!(
                "Updated {} membership(s) in group {}",
                group.memberships.len(),
                group.id
            );
        }

        Commands::UpdateMember {
            group_id,
            follower,
            patch,
        } => {
            let patch = patch.into_patch()?;
            coordinator
                .update_membership(&group_id, &follower, &patch)
                .await?;
            println!("Updated membership {} in group {}", follower, group_id);
        }

        Commands::Remove { group_id, follower } => {
            match coordinator.remove_membership(&group_id, &follower).await? {
                Some(group) => println!(
                    "Removed {} from group {} ({} member(s) left)",
                    follower,
                    group.id,
                    group.memberships.len()
                ),
                None => println!(
                    "Removed {}; group {} had no members left and was deleted",
                    follower, group_id
                ),
            }
        }

        Commands::Delete { group_id } => {
            coordinator.delete_group(&group_id).await?;
            println!("Deleted group {}", group_id);
        }

        Commands::Show { group_id } => {
            let group = coordinator.get_group(&group_id).await?;

            println!("\n=== Group {} ===", group.id);
            println!("Lead:     {}", group.lead_account_id);
            println!("Mode:     {}", group.mode.as_str());
            println!(
                "Risk:     {} x {}",
                group.risk_type.as_str(),
                group.risk_multiplier
            );
            println!(
                "Settings: tp={} sl={} max_lot={} slippage={} force_min={} pending={} reverse={}",
                group.settings.copy_take_profit,
                group.settings.copy_stop_loss,
                group.settings.max_lot,
                group.settings.slippage,
                group.settings.force_min_lot,
                group.settings.copy_pending_orders,
                group.settings.reverse_direction
            );

            println!(
                "\n{:<12} {:<20} {:<12} {:<8} {:<28} {}",
                "ACCOUNT", "NAME", "COPIER", "MODE", "RISK", "LEAD-COPY"
            );
            println!("{}", "-".repeat(92));

            for membership in &group.memberships {
                println!(
                    "{:<12} {:<20} {:<12} {:<8} {:<28} {}",
                    membership.follower_account_id,
                    truncate(&membership.follower_display_name, 18),
                    membership.remote_copier_id,
                    membership.settings.mode.as_str(),
                    format!(
                        "{} x {}",
                        membership.settings.risk_type.as_str(),
                        membership.settings.risk_value
                    ),
                    if membership.settings.is_lead_copy { "*" } else { "" }
                );
            }
        }

        Commands::Groups => {
            let groups = coordinator.list_groups(&cli.user).await?;

            if groups.is_empty() {
                println!("No copy groups. Use 'groupcopier create <lead> <follower>' to start one.");
                return Ok(());
            }

            println!(
                "\n{:<12} {:<12} {:<8} {:<28} {:>9}",
                "ID", "LEAD", "MODE", "RISK", "FOLLOWERS"
            );
            println!("{}", "-".repeat(74));

            for group in groups {
                println!(
                    "{:<12} {:<12} {:<8} {:<28} {:>9}",
                    group.id,
                    group.lead_account_id,
                    group.mode.as_str(),
                    format!("{} x {}", group.risk_type.as_str(), group.risk_multiplier),
                    group.memberships.len()
                );
            }
        }
    }

    Ok(())
}

/// Truncate a string with ellipsis if too long. Cuts on char boundaries,
/// so multibyte display names never split mid-character.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len - 3).collect();
        format!("{}...", cut)
    }
}
