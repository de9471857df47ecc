//! OpenID Connect discovery documents and the captured callback payload.

use serde::{Deserialize, Serialize};

/// Response of `GET /auth/oicd`: where to find the identity provider.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OidcInfo {
    pub authority: String,
    pub client_id: String,
}

/// Subset of `.well-known/openid-configuration` the login flow reads.
/// Unknown fields are kept so the cached file stays a faithful copy.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OidcMetadata {
    pub authorization_endpoint: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Query parameters the callback page forwards to `/token`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CapturedToken {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub expires_in: Option<String>,
}
