use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's followed match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: Option<i64>,
    pub user_id: String,
    /// `NormalizedMatch::id` of the followed fixture
    pub match_id: String,
    pub sport: String,
    pub added_at: DateTime<Utc>,
}
