//! REST API module for quota-rs
//!
//! Serves the server-side quota counters and donor flags

pub mod handlers;
pub mod server;

pub use handlers::{ApiError, AppState};
pub use server::ApiServer;
