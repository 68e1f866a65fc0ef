//! Telegram alerts for engine shutdowns

pub mod bot;

pub use bot::TelegramAlerter;
