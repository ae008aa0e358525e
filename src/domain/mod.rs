//! Usage: Domain modules (ACC forms fetching and the views built from them).

pub mod export;
pub mod forms;
