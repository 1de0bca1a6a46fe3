//! JSON-RPC API handlers for the daemon.

use std::sync::Arc;

use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::{ErrorCode, ErrorObject};
use tokenward_core::{CredentialName, TokenError, TokenKeeper};
use tracing::{debug, info};

/// Response containing a cached or freshly fetched token.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GetTokenResponse {
    /// The token value
    pub token: String,
    /// Expiration timestamp (RFC 3339)
    pub expires_at: String,
}

/// Information about one managed credential (RPC response)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CredentialInfo {
    /// Credential name
    pub name: String,
    /// Whether a token is currently cached
    pub cached: bool,
    /// Expiry of the cached token (RFC 3339), if one is cached
    pub expires_at: Option<String>,
}

/// Response containing all managed credentials.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ListCredentialsResponse {
    pub credentials: Vec<CredentialInfo>,
}

/// State shared across RPC handlers.
pub struct ApiState {
    /// Keeper that caches and refreshes all managed credentials.
    pub keeper: Arc<TokenKeeper>,
}

impl ApiState {
    /// Create a new API state around a running keeper.
    pub fn new(keeper: Arc<TokenKeeper>) -> Self {
        Self { keeper }
    }
}

/// JSON-RPC API trait definition.
#[rpc(server)]
pub trait TokenwardApi {
    /// Get a token for the named credential.
    ///
    /// Served from the cache when a live token is present; otherwise the
    /// daemon fetches one from the credential's source before replying.
    #[method(name = "get_token")]
    async fn get_token(&self, name: String) -> RpcResult<GetTokenResponse>;

    /// List all managed credentials and their cache state.
    #[method(name = "list_credentials")]
    async fn list_credentials(&self) -> RpcResult<ListCredentialsResponse>;
}

/// Implementation of the Tokenward API.
pub struct TokenwardApiImpl {
    state: ApiState,
}

impl TokenwardApiImpl {
    /// Create a new API implementation with the given state.
    pub fn new(state: ApiState) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl TokenwardApiServer for TokenwardApiImpl {
    async fn get_token(&self, name: String) -> RpcResult<GetTokenResponse> {
        info!("RPC: get_token({})", name);

        let name = CredentialName::new(name);
        match self.state.keeper.fetch(&name).await {
            Ok(token) => Ok(GetTokenResponse {
                token: token.secret.expose().to_string(),
                expires_at: token.expires_at.to_rfc3339(),
            }),
            Err(e) => Err(token_error(e)),
        }
    }

    async fn list_credentials(&self) -> RpcResult<ListCredentialsResponse> {
        debug!("RPC: list_credentials()");

        let mut credentials: Vec<CredentialInfo> = Vec::new();
        for name in self.state.keeper.credential_names() {
            // A credential can be removed between names() and peek();
            // treat that the same as an empty cache.
            let token = self.state.keeper.peek(&name).ok().flatten();
            credentials.push(CredentialInfo {
                name: name.to_string(),
                cached: token.is_some(),
                expires_at: token.map(|t| t.expires_at.to_rfc3339()),
            });
        }
        credentials.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ListCredentialsResponse { credentials })
    }
}

/// Map a keeper error onto a JSON-RPC error object.
fn token_error(err: TokenError) -> ErrorObject<'static> {
    let code = match &err {
        TokenError::NotFound { .. } => ErrorCode::InvalidParams.code(),
        _ => ErrorCode::InternalError.code(),
    };
    ErrorObject::owned(code, err.to_string(), None::<()>)
}
