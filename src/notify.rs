//! User-facing notifications emitted after group state changes.
//!
//! Events fire only once the change they describe is already persisted,
//! so a subscriber never hears about state that does not exist yet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

/// What happened to a group or account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    GroupCreated,
    FollowersAdded,
    GroupUpdated,
    MembershipUpdated,
    MembershipRemoved,
    GroupDeleted,
    AccountDeleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::GroupCreated => "group_created",
            EventKind::FollowersAdded => "followers_added",
            EventKind::GroupUpdated => "group_updated",
            EventKind::MembershipUpdated => "membership_updated",
            EventKind::MembershipRemoved => "membership_removed",
            EventKind::GroupDeleted => "group_deleted",
            EventKind::AccountDeleted => "account_deleted",
        }
    }
}

/// A single notification addressed to the owning user.
#[derive(Debug, Clone)]
pub struct GroupEvent {
    pub user_id: String,
    pub kind: EventKind,
    /// Absent for events that outlive the group (e.g. account deletion
    /// with no cascaded group).
    pub group_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl GroupEvent {
    pub fn new(user_id: &str, kind: EventKind, group_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            group_id: group_id.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// Delivery seam for notifications. Delivery is best-effort: a sink must
/// not fail the operation that produced the event.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: GroupEvent);
}

/// Sink that writes events to the log stream.
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, event: GroupEvent) {
        info!(
            user = %event.user_id,
            kind = event.kind.as_str(),
            group = event.group_id.as_deref().unwrap_or("-"),
            at = %event.timestamp.to_rfc3339(),
            "Notification"
        );
    }
}
