use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marketplaces whose listings are tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Youpin,
    Buff,
    C5,
    Steam,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Youpin,
        Platform::Buff,
        Platform::C5,
        Platform::Steam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youpin => "YOUPIN",
            Platform::Buff => "BUFF",
            Platform::C5 => "C5",
            Platform::Steam => "STEAM",
        }
    }

    /// Parse the platform tag used by the upstream aggregator (case-insensitive)
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "YOUPIN" | "YYYP" => Some(Platform::Youpin),
            "BUFF" => Some(Platform::Buff),
            "C5" | "C5GAME" => Some(Platform::C5),
            "STEAM" => Some(Platform::Steam),
            _ => None,
        }
    }

    /// Deep link to the item on this marketplace.
    ///
    /// YOUPIN, BUFF and C5 link by their own item id and yield an empty link
    /// until that id is resolved. STEAM links by the market hash name.
    pub fn link(&self, platform_item_id: &str, market_hash_name: &str) -> String {
        match self {
            Platform::Steam => {
                encoded_link("https://steamcommunity.com/market/listings/730", market_hash_name)
            }
            _ if platform_item_id.is_empty() => String::new(),
            Platform::Youpin => format!(
                "https://www.youpin898.com/market/goods-list?listType=10&templateId={}&gameId=730",
                platform_item_id
            ),
            Platform::Buff => format!("https://buff.163.com/goods/{}", platform_item_id),
            Platform::C5 => format!("https://www.c5game.com/csgo/{}/item.html", platform_item_id),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn encoded_link(base: &str, segment: &str) -> String {
    let Ok(mut url) = reqwest::Url::parse(base) else {
        return String::new();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.push(segment);
    }
    url.to_string()
}

/// Current best ask/bid state of one product on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRecord {
    pub platform_item_id: String,
    pub market_hash_name: String,
    pub sell_price: Decimal,
    pub sell_count: i32,
    pub bidding_price: Decimal,
    pub bidding_count: i32,
    /// Epoch seconds of the last upstream observation
    pub update_time: i64,
    pub before_time: i64,
    pub before_count: i32,
    pub turn_over: i32,
    pub link: String,
}

impl PlatformRecord {
    /// Zero-valued record for a product never seen on a platform
    pub fn empty(market_hash_name: &str) -> Self {
        Self {
            platform_item_id: String::new(),
            market_hash_name: market_hash_name.to_string(),
            sell_price: Decimal::ZERO,
            sell_count: 0,
            bidding_price: Decimal::ZERO,
            bidding_count: 0,
            update_time: 0,
            before_time: 0,
            before_count: 0,
            turn_over: 0,
            link: String::new(),
        }
    }
}

/// One platform's price tuple for one product, as returned by the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub market_hash_name: String,
    pub platform: Platform,
    pub platform_item_id: String,
    pub sell_price: Decimal,
    pub sell_count: i32,
    pub bidding_price: Decimal,
    pub bidding_count: i32,
    pub update_time: i64,
}
