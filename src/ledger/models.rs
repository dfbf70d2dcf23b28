use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Seconds between the Unix epoch and the ledger epoch (2000-01-01T00:00:00Z)
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

/// Convert a ledger-native release timestamp to calendar time
pub fn ripple_time_to_utc(ripple_secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ripple_secs + RIPPLE_EPOCH_OFFSET, 0)
}

/// An escrow ledger object as returned by the object listing query
#[derive(Debug, Clone, Deserialize)]
pub struct EscrowObject {
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Destination")]
    pub destination: Option<String>,
    /// Hash of the transaction that last affected this object; for an
    /// untouched escrow this is the creating transaction
    #[serde(rename = "PreviousTxnID")]
    pub previous_txn_id: String,
    /// Ledger-native release time; absent for cancel-only escrows
    #[serde(rename = "FinishAfter")]
    pub finish_after: Option<i64>,
    #[serde(rename = "CancelAfter")]
    pub cancel_after: Option<i64>,
}

/// One page of the cursor-based object listing
#[derive(Debug, Clone)]
pub struct AccountObjectsPage {
    pub objects: Vec<EscrowObject>,
    /// Continuation cursor; absent on the final page
    pub next_cursor: Option<String>,
}

/// A resolved historical transaction
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Sequence")]
    pub sequence: Option<i64>,
    #[serde(rename = "Memos")]
    pub memos: Option<serde_json::Value>,
    #[serde(rename = "DestinationTag")]
    pub destination_tag: Option<u32>,
    pub meta: Option<serde_json::Value>,
    pub hash: Option<String>,
}

/// Settlement result of one finish submission
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Engine result code, e.g. "tesSUCCESS" or "tecNO_TARGET"
    pub result_code: String,
    /// Full rpc result for logging and diagnostics
    pub raw: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ripple_epoch_maps_to_y2k() {
        let converted = ripple_time_to_utc(0).unwrap();
        assert_eq!(converted.to_rfc3339(), "2000-01-01T00:00:00+00:00");
    }

    #[test]
    fn ripple_time_offsets_forward() {
        // 86400 seconds into the ledger epoch is 2000-01-02.
        let converted = ripple_time_to_utc(86_400).unwrap();
        assert_eq!(converted.to_rfc3339(), "2000-01-02T00:00:00+00:00");
    }
}
