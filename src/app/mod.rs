//! Usage: Application wiring (shared state, snapshot store, background loads, logging).

pub mod app_state;
pub mod data_load;
pub mod forms_store;
pub mod logging;
