#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Session object as the ledger serves it.
///
/// Every field except the id is optional on the wire: clients degrade missing or
/// unexpected fields to defaults instead of rejecting the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LedgerSessionRecord {
    pub session_id: String,
    #[serde(default)]
    pub host_id: Option<String>,
    #[serde(default)]
    pub players: Option<Vec<String>>,
    /// 0=Waiting, 1=Active, 2=Ended.
    #[serde(default)]
    pub state: Option<u8>,
    #[serde(default)]
    pub start_timestamp_ms: Option<u64>,
    #[serde(default)]
    pub round_duration_ms: Option<u64>,
    #[serde(default)]
    pub round_count: Option<u32>,
    #[serde(default)]
    pub score_table_id: Option<String>,
    #[serde(default)]
    pub winners: Vec<String>,
}
