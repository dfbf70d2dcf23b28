use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use super::models::*;
use crate::{
    backfill::ingester::BackfillIngester,
    error::{AppError, AppResult},
    execution::engine::ExecutionEngine,
    store::models::{Network, ReleaseRecord},
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
    pub ingester: Arc<BackfillIngester>,
}

/// GET /health
pub async fn health_check() -> &'static str {
    "I am alive!"
}

/// Register a pending escrow release
/// POST /api/v1/escrows/finish
pub async fn add_record(
    State(state): State<AppState>,
    Json(request): Json<AddRecordRequest>,
) -> AppResult<Json<AddRecordResponse>> {
    if request.account.trim().is_empty() {
        return Err(AppError::InvalidInput("account must not be empty".into()));
    }
    if request.sequence <= 0 {
        return Err(AppError::InvalidInput("sequence must be positive".into()));
    }

    info!(
        "Registering release for {}#{} on {}",
        request.account, request.sequence, request.network
    );

    let outcome = state
        .engine
        .add_record(ReleaseRecord {
            identity: request.account,
            sequence: request.sequence,
            due_at: request.finish_after,
            network: request.network,
        })
        .await?;

    Ok(Json(AddRecordResponse {
        success: true,
        already_existed: outcome.already_existed,
    }))
}

/// Remove a pending escrow release
/// DELETE /api/v1/escrows/finish/:account/:sequence/:network
pub async fn remove_record(
    State(state): State<AppState>,
    Path((account, sequence, network)): Path<(String, i64, Network)>,
) -> AppResult<Json<RemoveRecordResponse>> {
    let removed = state.engine.remove_record(&account, sequence, network).await?;

    Ok(Json(RemoveRecordResponse {
        success: removed > 0,
        removed,
    }))
}

/// GET /api/v1/escrows/finish/:account/:sequence/:network
pub async fn record_exists(
    State(state): State<AppState>,
    Path((account, sequence, network)): Path<(String, i64, Network)>,
) -> AppResult<Json<ExistsResponse>> {
    let exists = state.engine.record_exists(&account, sequence, network).await?;

    Ok(Json(ExistsResponse { exists }))
}

/// All pending releases for an account
/// POST /api/v1/escrows
pub async fn list_records(
    State(state): State<AppState>,
    Json(request): Json<ListRecordsRequest>,
) -> AppResult<Json<ListRecordsResponse>> {
    if request.account.trim().is_empty() {
        return Err(AppError::InvalidInput("account must not be empty".into()));
    }

    let records = state
        .engine
        .records_for_account(&request.account, request.network)
        .await?;

    Ok(Json(ListRecordsResponse { records }))
}

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<AppState>) -> AppResult<Json<StatsResponse>> {
    Ok(Json(StatsResponse {
        pending: state.engine.pending_count().await?,
        next_due: state.engine.next_due().await?,
        last_due: state.engine.last_due().await?,
    }))
}

/// Kick off an on-demand backfill run
/// POST /api/v1/backfill
pub async fn trigger_backfill(State(state): State<AppState>) -> Json<BackfillResponse> {
    let ingester = state.ingester.clone();

    tokio::spawn(async move {
        if let Err(e) = ingester.ingest().await {
            error!("Backfill run failed: {}", e);
        }
    });

    Json(BackfillResponse { started: true })
}
