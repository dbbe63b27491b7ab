//! Domain models for trading accounts and copy groups.

mod account;
mod group;
mod settings;

pub use account::{ConnectionState, TradingAccount};
pub use group::{CopyGroup, FollowerMembership};
pub use settings::{resolve_update, CopierMode, CopierPatch, CopySettings, MemberSettings, RiskType};

use uuid::Uuid;

/// Opaque 10-character hex key used for accounts and groups.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}
