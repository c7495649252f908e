use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::platform::{Platform, PlatformRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformPrice {
    pub platform: Platform,
    #[serde(flatten)]
    pub record: PlatformRecord,
}

/// Cheapest ask on one platform against the best bid on another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSpread {
    pub buy_platform: Platform,
    pub buy_price: Decimal,
    pub sell_platform: Platform,
    pub sell_price: Decimal,
    pub difference: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPricesResponse {
    pub market_hash_name: String,
    pub platforms: Vec<PlatformPrice>,
    pub best_spread: Option<PriceSpread>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub market_hash_name: String,
    pub platform: Platform,
    pub sell_price: Decimal,
    pub sell_count: i32,
    pub record_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub market_hash_name: String,
    pub entries: Vec<PriceHistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Best cross-platform spread: lowest non-zero ask versus highest non-zero bid
/// on a different platform.
pub fn best_spread(prices: &[PlatformPrice]) -> Option<PriceSpread> {
    let buy = prices
        .iter()
        .filter(|p| p.record.sell_price > Decimal::ZERO)
        .min_by_key(|p| p.record.sell_price)?;

    let sell = prices
        .iter()
        .filter(|p| p.platform != buy.platform && p.record.bidding_price > Decimal::ZERO)
        .max_by_key(|p| p.record.bidding_price)?;

    Some(PriceSpread {
        buy_platform: buy.platform,
        buy_price: buy.record.sell_price,
        sell_platform: sell.platform,
        sell_price: sell.record.bidding_price,
        difference: sell.record.bidding_price - buy.record.sell_price,
    })
}
