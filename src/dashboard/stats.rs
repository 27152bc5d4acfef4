use async_trait::async_trait;
use serde::Serialize;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub active_users: u64,
    pub new_users: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub action: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Source of activity figures for the dashboard and profile pages.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn activity_stats(&self) -> ActivityStats;
    /// Most recent first. `None` means across all users.
    async fn recent_activity(&self, user_id: Option<i64>) -> Vec<ActivityEntry>;
}

/// Stand-in until there is an audit trail to read from: zero counts and a
/// fixed feed stamped relative to the current time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderStats;

const PLACEHOLDER_FEED: [(&str, i64); 3] = [
    ("User login", 2 * 60),
    ("Profile updated", 60 * 60),
    ("New user registered", 24 * 60 * 60),
];

#[async_trait]
impl StatsProvider for PlaceholderStats {
    async fn activity_stats(&self) -> ActivityStats {
        ActivityStats::default()
    }

    async fn recent_activity(&self, _user_id: Option<i64>) -> Vec<ActivityEntry> {
        let now = OffsetDateTime::now_utc();
        PLACEHOLDER_FEED
            .iter()
            .map(|(action, secs_ago)| ActivityEntry {
                action: action.to_string(),
                timestamp: now - Duration::seconds(*secs_ago),
            })
            .collect()
    }
}
