//! Error Responses
//!
//! JSON bodies for query failures. Clients key off the `error` string, so
//! the shapes here are part of the public contract.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::services::{QueryError, QueryKind};

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        match self {
            Self::UnknownSymbol { symbol, available } => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": format!("Symbol {symbol} not found"),
                    "availableSymbols": available,
                })),
            )
                .into_response(),
            Self::NoData { symbol } => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": format!("No data available for {symbol}"),
                    "message": "Data may not be available yet or market may be closed",
                })),
            )
                .into_response(),
            Self::Store { kind, source } => {
                tracing::error!(kind = ?kind, error = %source, "Query failed on store read");
                let body = match kind {
                    QueryKind::Equity => json!({ "error": "Failed to retrieve market data" }),
                    QueryKind::Crypto => json!({ "error": "Failed to retrieve crypto data" }),
                    QueryKind::AllPrices => json!({
                        "success": false,
                        "error": "Failed to fetch current prices",
                    }),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
