//! Usage: Dashboard HTTP server (axum router, handlers, pages) and the Autodesk OAuth client.

pub(crate) mod listen;
mod manager;
pub mod oauth;
mod pages;
mod routes;

pub use manager::{DashboardServer, DashboardStatus};
pub use routes::CALLBACK_ROUTE;
