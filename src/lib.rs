//! Offline-capable data access for pins.
//!
//! [`pin::PinRepository`] is the entry point: it reads and writes pins
//! through the HTTP transport in [`http`], keeps a local snapshot in a
//! [`store::LocalStore`] and queues writes that could not be delivered in a
//! [`sync::SyncQueue`] until `flush` is called.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod pin;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorCode, ErrorReporter};
pub use pin::{Pin, PinPatch, PinRepository};
