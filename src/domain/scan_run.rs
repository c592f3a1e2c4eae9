use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ScanStatus,
    pub preset: String,
    pub sectors: Vec<String>,
    pub ticker_count: u32,
    pub top_n: u32,
}

impl ScanRun {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        status: ScanStatus,
        preset: impl Into<String>,
        sectors: Vec<String>,
        ticker_count: u32,
        top_n: u32,
    ) -> Self {
        Self {
            id: id.into(),
            started_at,
            completed_at,
            status,
            preset: preset.into(),
            sectors,
            ticker_count,
            top_n,
        }
    }
}
