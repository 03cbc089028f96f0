//! HTTP surface of the service.

pub mod routes;

pub use routes::{AppState, api_routes};
