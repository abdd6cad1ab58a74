use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"status": "ok", "timestamp": "2024-06-01T12:00:00.000Z"}))]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 timestamp with millisecond precision
    pub timestamp: String,
}

impl HealthResponse {
    pub fn ok_at(now: DateTime<Utc>) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
