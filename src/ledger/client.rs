use super::models::{AccountObjectsPage, EscrowObject, SubmitOutcome, TransactionRecord};
use crate::config::NetworkCredential;
use crate::error::{AppError, AppResult, LedgerError};
use crate::store::models::Network;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// How long a provisionally accepted submission is given to appear in a
/// validated ledger before the attempt is reported as a fault.
const VALIDATION_POLL_ATTEMPTS: u32 = 10;
const VALIDATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Connection-oriented client abstraction over one ledger network.
///
/// Two independent instances exist, one per network, and each is owned
/// exclusively by its caller for the duration of a connect/submit/disconnect
/// cycle. The signing credential lives inside the client, one per network.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Idempotent: a no-op when already connected
    async fn connect(&self) -> AppResult<()>;

    /// Idempotent: a no-op when already disconnected
    async fn disconnect(&self) -> AppResult<()>;

    async fn is_connected(&self) -> bool;

    /// Submit a finish transaction for `owner`'s escrow at `sequence`, signed
    /// with this client's credential, and await the settlement result.
    /// `memos` is the serialized memo array to attach at transaction level.
    async fn submit_finish(
        &self,
        owner: &str,
        sequence: i64,
        memos: Option<&str>,
    ) -> AppResult<SubmitOutcome>;

    /// One page of the ledger-object listing for `account`, filtered to
    /// `object_type`, resuming from `cursor` when present
    async fn list_account_objects(
        &self,
        account: &str,
        object_type: &str,
        cursor: Option<String>,
    ) -> AppResult<AccountObjectsPage>;

    async fn fetch_transaction(&self, hash: &str) -> AppResult<TransactionRecord>;
}

/// JSON-RPC client for an XRPL endpoint.
///
/// HTTP is stateless, so "connected" is a verified-reachable flag: connect
/// performs a server_info round trip and disconnect clears the flag. Signing
/// is delegated to the endpoint's sign-and-submit mode, which keeps the agent
/// free of the ledger's binary serialization format but transmits the signing
/// secret with every submission. The configured endpoint must therefore be a
/// trusted rippled, typically self-hosted; public clusters generally refuse
/// sign-and-submit requests anyway.
///
/// A submission is only reported back once the transaction shows up in a
/// validated ledger; the provisional engine_result alone is never treated as
/// settled.
pub struct XrplHttpClient {
    endpoint: String,
    credential: NetworkCredential,
    network: Network,
    page_limit: u32,
    http: reqwest::Client,
    connected: RwLock<bool>,
}

impl XrplHttpClient {
    pub fn new(
        endpoint: &str,
        credential: NetworkCredential,
        network: Network,
        page_limit: u32,
        timeout: Duration,
        proxy_url: Option<&str>,
    ) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if let Some(proxy) = proxy_url {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).map_err(|e| LedgerError::Transport(e.to_string()))?,
            );
        }

        let http = builder
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            credential,
            network,
            page_limit,
            http,
            connected: RwLock::new(false),
        })
    }

    async fn rpc(&self, method: &str, params: Value) -> AppResult<Value> {
        let body = json!({ "method": method, "params": [params] });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(LedgerError::from)?;

        let payload: Value = response.json().await.map_err(LedgerError::from)?;

        let result = payload
            .get("result")
            .cloned()
            .ok_or_else(|| LedgerError::MalformedResponse("missing result object".to_string()))?;

        if let Some(error) = result.get("error").and_then(Value::as_str) {
            let message = result
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return Err(LedgerError::Rpc {
                code: error.to_string(),
                message,
            }
            .into());
        }

        Ok(result)
    }

    /// Poll the tx method until the submission is part of a validated ledger,
    /// then report the settled TransactionResult. Running out of attempts is
    /// a fault: the caller must not take the provisional code as settlement.
    async fn await_validation(
        &self,
        owner: &str,
        sequence: i64,
        hash: &str,
    ) -> AppResult<SubmitOutcome> {
        for _ in 0..VALIDATION_POLL_ATTEMPTS {
            tokio::time::sleep(VALIDATION_POLL_INTERVAL).await;

            let tx = match self.rpc("tx", json!({ "transaction": hash })).await {
                Ok(tx) => tx,
                // Not in any ledger yet
                Err(AppError::Ledger(LedgerError::Rpc { ref code, .. }))
                    if code == "txnNotFound" =>
                {
                    continue
                }
                Err(e) => return Err(e),
            };

            if let Some(code) = validated_result_code(&tx) {
                info!(
                    "Settled result for {}#{}: {} (tx {})",
                    owner, sequence, code, hash
                );
                return Ok(SubmitOutcome {
                    result_code: code.to_string(),
                    raw: tx,
                });
            }
        }

        Err(LedgerError::NotValidated {
            hash: hash.to_string(),
        }
        .into())
    }
}

/// Only tes and tec class codes can reach a validated ledger; every other
/// class is rejected before entering one and is final at submit time.
fn code_may_validate(code: &str) -> bool {
    code.starts_with("tes") || code.starts_with("tec")
}

fn submitted_tx_hash(result: &Value) -> Option<&str> {
    result.get("tx_json")?.get("hash")?.as_str()
}

/// The settled result code of a transaction, present only once the tx
/// response reports inclusion in a validated ledger.
fn validated_result_code(result: &Value) -> Option<&str> {
    if !result
        .get("validated")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return None;
    }
    result.get("meta")?.get("TransactionResult")?.as_str()
}

/// Markers are opaque: usually a string, occasionally a structured value.
/// They round trip through the cursor string untouched.
fn cursor_to_marker(cursor: &str) -> Value {
    serde_json::from_str(cursor).unwrap_or_else(|_| Value::String(cursor.to_string()))
}

fn marker_to_cursor(marker: &Value) -> String {
    match marker {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LedgerClient for XrplHttpClient {
    async fn connect(&self) -> AppResult<()> {
        if *self.connected.read() {
            return Ok(());
        }

        self.rpc("server_info", json!({})).await?;
        *self.connected.write() = true;
        debug!("Connected to {} ledger at {}", self.network, self.endpoint);
        Ok(())
    }

    async fn disconnect(&self) -> AppResult<()> {
        *self.connected.write() = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        *self.connected.read()
    }

    async fn submit_finish(
        &self,
        owner: &str,
        sequence: i64,
        memos: Option<&str>,
    ) -> AppResult<SubmitOutcome> {
        let mut tx_json = json!({
            "TransactionType": "EscrowFinish",
            "Account": self.credential.address,
            "Owner": owner,
            "OfferSequence": sequence,
        });

        if let Some(memos) = memos {
            let parsed: Value = serde_json::from_str(memos)
                .map_err(|e| LedgerError::InvalidMemo(e.to_string()))?;
            tx_json["Memos"] = parsed;
        }

        info!(
            "Submitting EscrowFinish for {}#{} on {}",
            owner, sequence, self.network
        );

        let result = self
            .rpc(
                "submit",
                json!({
                    "tx_json": tx_json,
                    "secret": self.credential.secret,
                    "fail_hard": false,
                }),
            )
            .await?;

        let provisional = result
            .get("engine_result")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::MalformedResponse("missing engine_result".to_string()))?
            .to_string();

        debug!(
            "Provisional submission result for {}#{}: {}",
            owner, sequence, provisional
        );

        if !code_may_validate(&provisional) {
            return Ok(SubmitOutcome {
                result_code: provisional,
                raw: result,
            });
        }

        // A provisional tes/tec can still be displaced at consensus, so the
        // settled code comes from the validated ledger, not from submit.
        let hash = submitted_tx_hash(&result)
            .ok_or_else(|| LedgerError::MalformedResponse("missing tx_json.hash".to_string()))?
            .to_string();

        self.await_validation(owner, sequence, &hash).await
    }

    async fn list_account_objects(
        &self,
        account: &str,
        object_type: &str,
        cursor: Option<String>,
    ) -> AppResult<AccountObjectsPage> {
        let mut params = json!({
            "account": account,
            "ledger_index": "validated",
            "limit": self.page_limit,
            "type": object_type,
        });

        if let Some(cursor) = &cursor {
            params["marker"] = cursor_to_marker(cursor);
        }

        let result = self.rpc("account_objects", params).await?;

        let objects: Vec<EscrowObject> = result
            .get("account_objects")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| LedgerError::MalformedResponse(e.to_string()))?
            .ok_or_else(|| {
                LedgerError::MalformedResponse("missing account_objects array".to_string())
            })?;

        let next_cursor = result.get("marker").map(marker_to_cursor);

        Ok(AccountObjectsPage {
            objects,
            next_cursor,
        })
    }

    async fn fetch_transaction(&self, hash: &str) -> AppResult<TransactionRecord> {
        let result = self.rpc("tx", json!({ "transaction": hash })).await?;

        let record: TransactionRecord = serde_json::from_value(result)
            .map_err(|e| LedgerError::MalformedResponse(e.to_string()))?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_cursor_round_trips() {
        let marker = cursor_to_marker("E71B5");
        assert_eq!(marker, Value::String("E71B5".to_string()));
        assert_eq!(marker_to_cursor(&marker), "E71B5");
    }

    #[test]
    fn structured_marker_round_trips() {
        let marker = json!({"ledger": 9, "seq": 42});
        let cursor = marker_to_cursor(&marker);
        assert_eq!(cursor_to_marker(&cursor), marker);
    }

    #[test]
    fn unvalidated_tx_has_no_settled_code() {
        let pending = json!({
            "validated": false,
            "meta": {"TransactionResult": "tesSUCCESS"},
        });
        assert_eq!(validated_result_code(&pending), None);

        let missing_flag = json!({"meta": {"TransactionResult": "tesSUCCESS"}});
        assert_eq!(validated_result_code(&missing_flag), None);
    }

    #[test]
    fn validated_tx_yields_meta_result() {
        let settled = json!({
            "validated": true,
            "meta": {"TransactionResult": "tecNO_TARGET"},
        });
        assert_eq!(validated_result_code(&settled), Some("tecNO_TARGET"));
    }

    #[test]
    fn only_ledger_class_codes_wait_for_validation() {
        assert!(code_may_validate("tesSUCCESS"));
        assert!(code_may_validate("tecNO_PERMISSION"));
        assert!(!code_may_validate("temMALFORMED"));
        assert!(!code_may_validate("tefPAST_SEQ"));
        assert!(!code_may_validate("telINSUF_FEE_P"));
    }

    #[test]
    fn submitted_hash_is_read_from_tx_json() {
        let result = json!({"tx_json": {"hash": "ABCD1234"}});
        assert_eq!(submitted_tx_hash(&result), Some("ABCD1234"));
        assert_eq!(submitted_tx_hash(&json!({})), None);
    }
}
