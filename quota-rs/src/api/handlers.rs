//! API handlers for the quota store and donor lookup

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::QuotaError;
use crate::quota::{
    DonorDirectory, DonorStatus, Identity, Period, QuotaRecord, QuotaStore, SqliteDonorDirectory,
    SqliteQuotaStore,
};

/// Shared application state
pub struct AppState {
    pub store: SqliteQuotaStore,
    pub donors: SqliteDonorDirectory,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn error_response(e: QuotaError) -> (StatusCode, Json<ApiError>) {
    let status = match e {
        QuotaError::InvalidPeriod(_) | QuotaError::InvalidAsset(_) => StatusCode::BAD_REQUEST,
        QuotaError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            error!("Quota API error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiError::new(e.to_string())))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /api/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/quotas/:kind/:identity/:period - Point lookup of one counter
pub async fn get_quota(
    State(state): State<Arc<AppState>>,
    Path((kind, identity, period)): Path<(String, String, String)>,
) -> ApiResult<Json<QuotaRecord>> {
    let identity = Identity::from_parts(&kind, &identity).map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(ApiError::new(e.to_string())))
    })?;
    let period: Period = period.parse().map_err(error_response)?;

    state
        .store
        .fetch(&identity, &period)
        .await
        .map_err(error_response)?
        .map(Json)
        .ok_or_else(|| {
            error_response(QuotaError::NotFound(format!("{} in {}", identity, period)))
        })
}

/// PUT /api/quotas - Insert or update a counter
pub async fn put_quota(
    State(state): State<Arc<AppState>>,
    Json(record): Json<QuotaRecord>,
) -> ApiResult<StatusCode> {
    if record.identity.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("identity must not be empty")),
        ));
    }

    state.store.upsert(&record).await.map_err(error_response)?;

    info!(
        identity = %record.owner(),
        period = %record.period,
        count = record.count,
        "Quota record upserted"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/donors/:account - Donor flag of an account
pub async fn get_donor(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> ApiResult<Json<DonorStatus>> {
    let has_donated = state
        .donors
        .has_donated(&account_id)
        .await
        .map_err(error_response)?;

    Ok(Json(DonorStatus {
        account_id,
        has_donated,
    }))
}

/// POST /api/donors/:account - Mark an account as donor after a confirmed payment
pub async fn mark_donor(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .donors
        .set_donor(&account_id, true)
        .await
        .map_err(error_response)?;

    info!(account_id = %account_id, "Account marked as donor");
    Ok(StatusCode::NO_CONTENT)
}
