pub(crate) mod http_client;
pub mod settings;
