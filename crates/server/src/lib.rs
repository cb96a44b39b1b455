//! HTTP transport and process wiring for the collector.
//!
//! [`service::Collector`] is the operation surface; [`router::build_router`]
//! exposes it over axum; [`startup::run`] owns the process lifecycle.

pub mod api;
pub mod auth;
pub mod background;
pub mod cli;
pub mod error;
pub mod router;
pub mod service;
pub mod startup;
pub mod state;

pub use error::ApiError;
pub use service::Collector;
pub use state::AppState;
