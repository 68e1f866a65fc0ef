//! Trading strategies - Bundled implementations

pub mod scalping;

pub use scalping::{ExampleScalpingStrategy, OrderState};
