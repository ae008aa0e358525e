//! Usage: Autodesk OAuth (client credentials, three-legged browser login, code exchange).

mod authenticator;
pub(crate) mod browser;
pub(crate) mod callback_server;
pub(crate) mod token_exchange;

pub use authenticator::{AccAuthenticator, BrowserLoginOutcome};
pub use token_exchange::TokenSet;
