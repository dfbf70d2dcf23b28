use crate::store::models::{Network, ReleaseRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AddRecordRequest {
    pub account: String,
    pub sequence: i64,
    /// Release time of the escrow; finalization is attempted once it elapses
    pub finish_after: DateTime<Utc>,
    pub network: Network,
}

#[derive(Debug, Serialize)]
pub struct AddRecordResponse {
    pub success: bool,
    pub already_existed: bool,
}

#[derive(Debug, Serialize)]
pub struct RemoveRecordResponse {
    pub success: bool,
    pub removed: u64,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListRecordsRequest {
    pub account: String,
    pub network: Network,
}

#[derive(Debug, Serialize)]
pub struct ListRecordsResponse {
    pub records: Vec<ReleaseRecord>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub pending: i64,
    /// Epoch milliseconds, -1 when no records are stored
    pub next_due: i64,
    pub last_due: i64,
}

#[derive(Debug, Serialize)]
pub struct BackfillResponse {
    pub started: bool,
}
