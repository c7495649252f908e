pub use super::api_credentials::Entity as ApiCredentials;
pub use super::buff_items::Entity as BuffItems;
pub use super::c5_items::Entity as C5Items;
pub use super::price_history::Entity as PriceHistory;
pub use super::products::Entity as Products;
pub use super::steam_items::Entity as SteamItems;
pub use super::sync_status::Entity as SyncStatus;
pub use super::youpin_items::Entity as YoupinItems;
