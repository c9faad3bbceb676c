use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness signal. Does not touch index state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub now: DateTime<Utc>,
}

impl Health {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            now: Utc::now(),
        }
    }
}

/// Summary of the live index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub scheme: String,
    /// Scheme the stored vectors were built with, when it differs from the
    /// configured one and a rebuild is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_scheme: Option<String>,
    pub generation: u64,
    pub entries: usize,
    pub jobs: usize,
    pub vocabulary: Option<usize>,
    pub index_dir: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_serializes_rfc3339() {
        let health = Health::ok();
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "ok");
        let now = json["now"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(now).is_ok());
    }
}
