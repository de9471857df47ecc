//! Credentials: OIDC discovery, the browser login flow and the token cache.

pub mod browser;
pub mod discovery;
pub mod oauth;
pub mod token;

pub use browser::{BrowserLauncher, SystemBrowser};
pub use discovery::Discovery;
pub use oauth::{CallbackListener, FlowState, OAuthSession, OidcFlow};
pub use token::{BearerToken, JwksVerifier, TokenCache, TokenFlow, TokenVerifier};
