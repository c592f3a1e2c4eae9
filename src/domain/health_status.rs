use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub llm_available: bool,
    pub vendor_available: bool,
    pub persistence_available: bool,
    pub llm_models: Vec<String>,
    pub last_check_utc: DateTime<Utc>,
}
