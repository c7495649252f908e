pub mod credential;
pub mod platform;
pub mod prices;
pub mod session;
