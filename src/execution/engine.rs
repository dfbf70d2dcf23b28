use crate::error::AppResult;
use crate::ledger::client::LedgerClient;
use crate::ledger::codes::{ResultClass, ResultClassifier};
use crate::store::models::{split_annotation, Network, ReleaseRecord};
use crate::store::repository::{DueBoundary, EscrowStore, InsertOutcome};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-record finalization outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Finished, or moot - the record is deleted
    Done,
    /// Left in the store for a later tick
    Pending,
}

/// What one due scan did
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub scanned: usize,
    pub finalized: usize,
    pub deferred: usize,
    /// True when the tick was dropped because a prior scan was still running
    pub skipped: bool,
}

impl ScanSummary {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Finalizes due escrow releases.
///
/// One scan processes records sequentially: submitting many finish
/// transactions from the same signing account in parallel risks
/// sequence-number conflicts on the ledger, so submissions are deliberately
/// serialized per tick. Scans themselves never overlap; a tick arriving while
/// a scan is still running is skipped.
pub struct ExecutionEngine {
    store: Arc<dyn EscrowStore>,
    clients: HashMap<Network, Arc<dyn LedgerClient>>,
    classifier: ResultClassifier,
    skew_minutes: i64,
    scan_guard: tokio::sync::Mutex<()>,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn EscrowStore>,
        classifier: ResultClassifier,
        skew_minutes: i64,
    ) -> Self {
        Self {
            store,
            clients: HashMap::new(),
            classifier,
            skew_minutes,
            scan_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Register the client for a network. Only call during initialization.
    pub fn register_client(&mut self, network: Network, client: Arc<dyn LedgerClient>) {
        info!("Registering ledger client for {} network", network);
        self.clients.insert(network, client);
    }

    /// Scan the store for due records and attempt to finalize each one.
    ///
    /// Records that finish (or turn out to be moot) are deleted; the rest stay
    /// for the next tick. No attempt count survives the tick.
    pub async fn run_due_scan(&self) -> AppResult<ScanSummary> {
        let _guard = match self.scan_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("⏭️  Previous due scan still running, skipping this tick");
                return Ok(ScanSummary::skipped());
            }
        };

        let scan_id = Uuid::new_v4();
        // The skew keeps the agent from racing the ledger's own clock and
        // gives freshly registered records a grace period.
        let window_end = Utc::now() - Duration::minutes(self.skew_minutes);
        let due = self
            .store
            .find_due(DateTime::UNIX_EPOCH, window_end)
            .await?;

        info!(
            "🔎 Due scan {}: {} record(s) due before {}",
            scan_id,
            due.len(),
            window_end
        );

        let mut summary = ScanSummary {
            scanned: due.len(),
            ..ScanSummary::default()
        };

        for record in &due {
            match self.finalize(record).await {
                Outcome::Done => {
                    match self
                        .store
                        .delete(record.base_identity(), record.sequence, record.network)
                        .await
                    {
                        Ok(_) => {
                            summary.finalized += 1;
                            debug!(
                                "Removed release record {}#{} ({})",
                                record.base_identity(),
                                record.sequence,
                                record.network
                            );
                        }
                        // The record stays behind and is re-attempted next
                        // tick; a second finish resolves as moot.
                        Err(e) => error!(
                            "Failed to delete finalized record {}#{}: {}",
                            record.base_identity(),
                            record.sequence,
                            e
                        ),
                    }
                }
                Outcome::Pending => summary.deferred += 1,
            }
        }

        info!(
            "✓ Due scan {} finished: {} finalized, {} deferred",
            scan_id, summary.finalized, summary.deferred
        );

        Ok(summary)
    }

    /// One finalization cycle for a single record: connect, submit with at
    /// most one in-tick retry, classify, disconnect on every exit path.
    async fn finalize(&self, record: &ReleaseRecord) -> Outcome {
        let Some(client) = self.clients.get(&record.network) else {
            error!("No ledger client registered for {} network", record.network);
            return Outcome::Pending;
        };

        let attempt = self.submit_with_retry(client.as_ref(), record).await;

        if client.is_connected().await {
            if let Err(e) = client.disconnect().await {
                warn!("Failed to disconnect {} client: {}", record.network, e);
            }
        }

        match attempt {
            Ok(outcome) => outcome,
            Err(e) => match record.network {
                // A flaky test endpoint must not starve the queue: faults on
                // the test network drop the record instead of retrying.
                Network::Test => {
                    warn!(
                        "Absorbing test-network fault for {}#{}: {}",
                        record.base_identity(),
                        record.sequence,
                        e
                    );
                    Outcome::Done
                }
                Network::Production => {
                    warn!(
                        "Deferring {}#{} to next tick after fault: {}",
                        record.base_identity(),
                        record.sequence,
                        e
                    );
                    Outcome::Pending
                }
            },
        }
    }

    async fn submit_with_retry(
        &self,
        client: &dyn LedgerClient,
        record: &ReleaseRecord,
    ) -> AppResult<Outcome> {
        if !client.is_connected().await {
            client.connect().await?;
        }

        let (owner, memo) = split_annotation(&record.identity);

        for attempt in 0..2 {
            let outcome = client.submit_finish(owner, record.sequence, memo).await?;

            match self.classifier.classify(&outcome.result_code) {
                ResultClass::Success => {
                    info!(
                        "✓ Escrow {}#{} finished on {} ({})",
                        owner, record.sequence, record.network, outcome.result_code
                    );
                    return Ok(Outcome::Done);
                }
                ResultClass::Moot => {
                    info!(
                        "Escrow {}#{} already gone or unfinishable ({}), dropping record",
                        owner, record.sequence, outcome.result_code
                    );
                    return Ok(Outcome::Done);
                }
                ResultClass::Retryable if attempt == 0 => {
                    warn!(
                        "Finish attempt for {}#{} returned {}, retrying once",
                        owner, record.sequence, outcome.result_code
                    );
                }
                ResultClass::Retryable => {
                    warn!(
                        "Second finish attempt for {}#{} returned {}, deferring to next tick",
                        owner, record.sequence, outcome.result_code
                    );
                }
            }
        }

        Ok(Outcome::Pending)
    }

    // ========== INTAKE PASS-THROUGHS ==========

    pub async fn add_record(&self, record: ReleaseRecord) -> AppResult<InsertOutcome> {
        self.store.insert_if_absent(record).await
    }

    pub async fn remove_record(
        &self,
        identity: &str,
        sequence: i64,
        network: Network,
    ) -> AppResult<u64> {
        self.store.delete(identity, sequence, network).await
    }

    pub async fn record_exists(
        &self,
        identity: &str,
        sequence: i64,
        network: Network,
    ) -> AppResult<bool> {
        self.store.exists(identity, sequence, network).await
    }

    pub async fn records_for_account(
        &self,
        identity: &str,
        network: Network,
    ) -> AppResult<Vec<ReleaseRecord>> {
        self.store.find_by_account(identity, network).await
    }

    pub async fn pending_count(&self) -> AppResult<i64> {
        self.store.count().await
    }

    pub async fn next_due(&self) -> AppResult<i64> {
        self.store.due_boundary(DueBoundary::Next).await
    }

    pub async fn last_due(&self) -> AppResult<i64> {
        self.store.due_boundary(DueBoundary::Last).await
    }
}
