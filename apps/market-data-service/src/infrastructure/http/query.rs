//! Snapshot Query Handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde::Serialize;

use super::AppState;
use crate::application::services::{EquityView, QueryError};
use crate::domain::quote::CryptoQuote;

/// Body of `GET /api/current/data/all`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllPricesResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// Price by ticker, crypto pairs by their three-letter prefix.
    pub data: BTreeMap<String, f64>,
}

/// `GET /api/market/data/{symbol}`
pub async fn equity_data(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<EquityView>, QueryError> {
    state.query.get_equity(&symbol, Utc::now()).await.map(Json)
}

/// `GET /api/crypto/data/{symbol}`
pub async fn crypto_data(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<CryptoQuote>, QueryError> {
    state.query.get_crypto(&symbol, Utc::now()).await.map(Json)
}

/// `GET /api/current/data/all`
pub async fn all_prices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AllPricesResponse>, QueryError> {
    let data = state.query.get_all_prices().await?;
    Ok(Json(AllPricesResponse {
        success: true,
        data,
    }))
}
