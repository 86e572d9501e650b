//! Core types and service wiring for the Metrohelp campus information kiosk.

/// Last-known-good storage for provider data and settings.
pub mod cache;
/// Static kiosk configuration.
pub mod config;
/// Domain models shared by all providers.
pub mod model;
/// Localized placeholder texts.
pub mod notices;
/// Registry plugging provider ports into the aggregator.
pub mod plugin;
/// Traits describing the provider interfaces.
pub mod ports;
/// Timed refreshes and update publishing.
pub mod scheduler;
/// Process-wide display selection.
pub mod selection;
/// High-level aggregation facade used by clients.
pub mod service;

pub use cache::*;
pub use config::*;
pub use model::*;
pub use plugin::*;
pub use ports::*;
pub use scheduler::*;
pub use selection::*;
pub use service::*;
