use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Duration;

use crate::{
    models::{
        platform::Platform,
        prices::{
            best_spread, ErrorResponse, HistoryQuery, HistoryResponse, ItemPricesResponse,
            PlatformPrice,
        },
    },
    services::clock::Clock,
    AppState,
};

const DEFAULT_HISTORY_DAYS: u32 = 30;
const MAX_HISTORY_DAYS: u32 = 365;

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!("Price lookup failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Failed to load prices".to_string(),
        }),
    )
}

/// Handler for GET /api/prices/{market_hash_name}
/// Current prices on every platform plus the best cross-platform spread
pub async fn get_item_prices(
    State(state): State<AppState>,
    Path(market_hash_name): Path<String>,
) -> Result<Json<ItemPricesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let names = [market_hash_name.clone()];
    let mut platforms = Vec::new();

    for platform in Platform::ALL {
        let mut found = state
            .platforms
            .load(platform, &names)
            .await
            .map_err(internal_error)?;

        if let Some(record) = found.remove(&market_hash_name) {
            platforms.push(PlatformPrice { platform, record });
        }
    }

    if platforms.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No prices for {}", market_hash_name),
            }),
        ));
    }

    let best_spread = best_spread(&platforms);
    Ok(Json(ItemPricesResponse {
        market_hash_name,
        platforms,
        best_spread,
    }))
}

/// Handler for GET /api/history/{market_hash_name}?days=N
pub async fn get_item_history(
    State(state): State<AppState>,
    Path(market_hash_name): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, Json<ErrorResponse>)> {
    let days = query
        .days
        .unwrap_or(DEFAULT_HISTORY_DAYS)
        .clamp(1, MAX_HISTORY_DAYS);
    let since = state.clock.now().date_naive() - Duration::days(days as i64);

    let entries = state
        .history
        .history_for(&market_hash_name, since)
        .await
        .map_err(internal_error)?;

    Ok(Json(HistoryResponse {
        market_hash_name,
        entries,
    }))
}

pub async fn health() -> &'static str {
    "ok"
}
