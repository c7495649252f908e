use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream aggregator API key with its usage bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredential {
    pub id: i32,
    pub key: String,
    pub last_used: Option<DateTime<Utc>>,
    pub fail_count: i32,
}
