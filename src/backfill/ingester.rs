use crate::error::{AppResult, IngestError};
use crate::ledger::client::LedgerClient;
use crate::ledger::models::{ripple_time_to_utc, EscrowObject};
use crate::store::models::{attach_annotation, Network, ReleaseRecord};
use crate::store::repository::EscrowStore;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ESCROW_OBJECT_TYPE: &str = "escrow";
const ESCROW_CREATE_TYPE: &str = "EscrowCreate";

/// What one ingestion run did
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub pages: usize,
    pub seen: usize,
    pub upserted: usize,
    pub skipped: usize,
}

/// Bulk-replays the production ledger's current escrow objects into the
/// store.
///
/// The walk is an explicit cursor loop over the paginated object listing.
/// The cursor lives only inside one run: a crash restarts from the beginning,
/// which is safe because every insert is idempotent. Any error aborts the run
/// without rolling back partial progress - re-running is the recovery path.
pub struct BackfillIngester {
    store: Arc<dyn EscrowStore>,
    client: Arc<dyn LedgerClient>,
    watched_account: String,
    destination_tag_sentinel: u32,
}

impl BackfillIngester {
    pub fn new(
        store: Arc<dyn EscrowStore>,
        client: Arc<dyn LedgerClient>,
        watched_account: String,
        destination_tag_sentinel: u32,
    ) -> Self {
        Self {
            store,
            client,
            watched_account,
            destination_tag_sentinel,
        }
    }

    pub async fn ingest(&self) -> AppResult<IngestSummary> {
        let run_id = Uuid::new_v4();
        info!(
            "📥 Backfill {} starting for account {}",
            run_id, self.watched_account
        );

        if !self.client.is_connected().await {
            self.client.connect().await?;
        }

        let mut summary = IngestSummary::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .client
                .list_account_objects(&self.watched_account, ESCROW_OBJECT_TYPE, cursor)
                .await?;
            summary.pages += 1;

            for object in &page.objects {
                summary.seen += 1;

                if self.import_object(object).await? {
                    summary.upserted += 1;
                    if summary.upserted % 100 == 0 {
                        info!(
                            "Backfill {}: {} records upserted so far",
                            run_id, summary.upserted
                        );
                    }
                } else {
                    summary.skipped += 1;
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            "✓ Backfill {} finished: {} page(s), {} object(s) seen, {} upserted, {} skipped",
            run_id, summary.pages, summary.seen, summary.upserted, summary.skipped
        );

        Ok(summary)
    }

    /// Resolve one escrow object's creating transaction and upsert a release
    /// record. Returns false when the object is skipped.
    async fn import_object(&self, object: &EscrowObject) -> AppResult<bool> {
        let tx = self.client.fetch_transaction(&object.previous_txn_id).await?;

        if tx.meta.is_none() {
            return Err(IngestError::MissingMeta {
                hash: object.previous_txn_id.clone(),
            }
            .into());
        }
        if tx.transaction_type != ESCROW_CREATE_TYPE {
            return Err(IngestError::NotEscrowCreate {
                hash: object.previous_txn_id.clone(),
            }
            .into());
        }

        // A foreign destination tag means the escrow is not addressed to this
        // agent.
        if let Some(tag) = tx.destination_tag {
            if tag != self.destination_tag_sentinel {
                debug!(
                    "Skipping escrow with destination tag {} (tx {})",
                    tag, object.previous_txn_id
                );
                return Ok(false);
            }
        }

        let Some(finish_after) = object.finish_after else {
            warn!(
                "Escrow from tx {} has no release time (cancel-only), skipping",
                object.previous_txn_id
            );
            return Ok(false);
        };
        let due_at = ripple_time_to_utc(finish_after)
            .ok_or(IngestError::InvalidReleaseTime(finish_after))?;

        let sequence = tx.sequence.ok_or(IngestError::MissingField("Sequence"))?;

        let identity = match &tx.memos {
            Some(memos) => attach_annotation(&object.account, &memos.to_string()),
            None => object.account.clone(),
        };

        self.store
            .insert_if_absent(ReleaseRecord {
                identity,
                sequence,
                due_at,
                network: Network::Production,
            })
            .await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::ledger::models::{AccountObjectsPage, SubmitOutcome, TransactionRecord};
    use crate::store::repository::MemoryEscrowStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct PagedStubClient {
        pages: Vec<AccountObjectsPage>,
        transactions: HashMap<String, TransactionRecord>,
        list_calls: Mutex<u32>,
        connected: Mutex<bool>,
    }

    impl PagedStubClient {
        fn new(
            pages: Vec<AccountObjectsPage>,
            transactions: HashMap<String, TransactionRecord>,
        ) -> Self {
            Self {
                pages,
                transactions,
                list_calls: Mutex::new(0),
                connected: Mutex::new(false),
            }
        }

        fn list_call_count(&self) -> u32 {
            *self.list_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LedgerClient for PagedStubClient {
        async fn connect(&self) -> AppResult<()> {
            *self.connected.lock().unwrap() = true;
            Ok(())
        }

        async fn disconnect(&self) -> AppResult<()> {
            *self.connected.lock().unwrap() = false;
            Ok(())
        }

        async fn is_connected(&self) -> bool {
            *self.connected.lock().unwrap()
        }

        async fn submit_finish(
            &self,
            _owner: &str,
            _sequence: i64,
            _memos: Option<&str>,
        ) -> AppResult<SubmitOutcome> {
            unimplemented!("not used by ingester tests")
        }

        async fn list_account_objects(
            &self,
            _account: &str,
            _object_type: &str,
            cursor: Option<String>,
        ) -> AppResult<AccountObjectsPage> {
            let mut calls = self.list_calls.lock().unwrap();
            let index = match cursor {
                None => 0,
                Some(c) => c.parse::<usize>().unwrap(),
            };
            *calls += 1;
            Ok(self.pages[index].clone())
        }

        async fn fetch_transaction(&self, hash: &str) -> AppResult<TransactionRecord> {
            self.transactions
                .get(hash)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("tx {}", hash)))
        }
    }

    fn escrow_object(account: &str, txn: &str, finish_after: Option<i64>) -> EscrowObject {
        EscrowObject {
            account: account.to_string(),
            destination: Some("rAgent".to_string()),
            previous_txn_id: txn.to_string(),
            finish_after,
            cancel_after: None,
        }
    }

    fn create_tx(sequence: i64) -> TransactionRecord {
        TransactionRecord {
            transaction_type: "EscrowCreate".to_string(),
            sequence: Some(sequence),
            memos: None,
            destination_tag: None,
            meta: Some(json!({"TransactionResult": "tesSUCCESS"})),
            hash: None,
        }
    }

    fn ingester_with(
        client: Arc<PagedStubClient>,
    ) -> (BackfillIngester, Arc<MemoryEscrowStore>) {
        let store = Arc::new(MemoryEscrowStore::new());
        let ingester = BackfillIngester::new(store.clone(), client, "rPepper".to_string(), 1);
        (ingester, store)
    }

    #[tokio::test]
    async fn walks_all_pages_and_terminates() {
        let pages = vec![
            AccountObjectsPage {
                objects: vec![escrow_object("rAlice", "T1", Some(0))],
                next_cursor: Some("1".to_string()),
            },
            AccountObjectsPage {
                objects: vec![escrow_object("rBob", "T2", Some(86_400))],
                next_cursor: Some("2".to_string()),
            },
            AccountObjectsPage {
                objects: vec![escrow_object("rCarol", "T3", Some(172_800))],
                next_cursor: None,
            },
        ];
        let transactions = HashMap::from([
            ("T1".to_string(), create_tx(1)),
            ("T2".to_string(), create_tx(2)),
            ("T3".to_string(), create_tx(3)),
        ]);
        let client = Arc::new(PagedStubClient::new(pages, transactions));
        let (ingester, store) = ingester_with(client.clone());

        let summary = ingester.ingest().await.unwrap();

        assert_eq!(client.list_call_count(), 3);
        assert_eq!(summary.pages, 3);
        assert_eq!(summary.upserted, 3);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn skips_foreign_destination_tags() {
        let mut tagged = create_tx(5);
        tagged.destination_tag = Some(7);
        let pages = vec![AccountObjectsPage {
            objects: vec![
                escrow_object("rAlice", "T1", Some(0)),
                escrow_object("rBob", "T2", Some(0)),
            ],
            next_cursor: None,
        }];
        let transactions = HashMap::from([
            ("T1".to_string(), create_tx(1)),
            ("T2".to_string(), tagged),
        ]);
        let client = Arc::new(PagedStubClient::new(pages, transactions));
        let (ingester, store) = ingester_with(client);

        let summary = ingester.ingest().await.unwrap();

        assert_eq!(summary.upserted, 1);
        assert_eq!(summary.skipped, 1);
        assert!(store.exists("rAlice", 1, Network::Production).await.unwrap());
        assert!(!store.exists("rBob", 5, Network::Production).await.unwrap());
    }

    #[tokio::test]
    async fn sentinel_tag_is_accepted() {
        let mut addressed = create_tx(4);
        addressed.destination_tag = Some(1);
        let pages = vec![AccountObjectsPage {
            objects: vec![escrow_object("rAlice", "T1", Some(0))],
            next_cursor: None,
        }];
        let transactions = HashMap::from([("T1".to_string(), addressed)]);
        let client = Arc::new(PagedStubClient::new(pages, transactions));
        let (ingester, store) = ingester_with(client);

        ingester.ingest().await.unwrap();

        assert!(store.exists("rAlice", 4, Network::Production).await.unwrap());
    }

    #[tokio::test]
    async fn memo_is_embedded_into_identity() {
        let mut with_memo = create_tx(9);
        with_memo.memos = Some(json!([{"Memo": {"MemoData": "AB"}}]));
        let pages = vec![AccountObjectsPage {
            objects: vec![escrow_object("rAlice", "T1", Some(0))],
            next_cursor: None,
        }];
        let transactions = HashMap::from([("T1".to_string(), with_memo)]);
        let client = Arc::new(PagedStubClient::new(pages, transactions));
        let (ingester, store) = ingester_with(client);

        ingester.ingest().await.unwrap();

        let records = store
            .find_by_account("rAlice", Network::Production)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].base_identity(), "rAlice");
        assert_eq!(
            records[0].annotation(),
            Some(r#"[{"Memo":{"MemoData":"AB"}}]"#)
        );
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let pages = vec![AccountObjectsPage {
            objects: vec![escrow_object("rAlice", "T1", Some(0))],
            next_cursor: None,
        }];
        let transactions = HashMap::from([("T1".to_string(), create_tx(1))]);
        let client = Arc::new(PagedStubClient::new(pages, transactions));
        let (ingester, store) = ingester_with(client);

        ingester.ingest().await.unwrap();
        ingester.ingest().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_meta_aborts_but_keeps_progress() {
        let mut no_meta = create_tx(2);
        no_meta.meta = None;
        let pages = vec![AccountObjectsPage {
            objects: vec![
                escrow_object("rAlice", "T1", Some(0)),
                escrow_object("rBob", "T2", Some(0)),
            ],
            next_cursor: None,
        }];
        let transactions = HashMap::from([
            ("T1".to_string(), create_tx(1)),
            ("T2".to_string(), no_meta),
        ]);
        let client = Arc::new(PagedStubClient::new(pages, transactions));
        let (ingester, store) = ingester_with(client);

        let result = ingester.ingest().await;

        assert!(result.is_err());
        // The record imported before the fault stays.
        assert!(store.exists("rAlice", 1, Network::Production).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_only_escrows_are_skipped() {
        let pages = vec![AccountObjectsPage {
            objects: vec![escrow_object("rAlice", "T1", None)],
            next_cursor: None,
        }];
        let transactions = HashMap::from([("T1".to_string(), create_tx(1))]);
        let client = Arc::new(PagedStubClient::new(pages, transactions));
        let (ingester, store) = ingester_with(client);

        let summary = ingester.ingest().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
