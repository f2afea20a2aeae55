//! Authentication module

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error, warn};
use zapcast_common::types::{ApiKeyId, UserId};
use zapcast_common::Config;
use zapcast_core::{
    CampaignDispatcher, CampaignManager, ContactListParser, GatewayDirectory, MessageGateway,
};
use zapcast_storage::repository::api_keys::ApiKey;
use zapcast_storage::{
    ApiKeyRepository, ApiKeyRepositoryTrait, DatabasePool, DbCampaignStateStore,
    InstanceRepository,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabasePool,
    pub config: Arc<Config>,
    pub instances: InstanceRepository,
    pub manager: Arc<CampaignManager>,
    pub parser: ContactListParser,
}

impl AppState {
    /// Wire the dispatcher and campaign manager over `db_pool`, sending
    /// through `gateway`
    pub fn new(db_pool: DatabasePool, config: Config, gateway: Arc<dyn MessageGateway>) -> Self {
        let instances = InstanceRepository::new(db_pool.clone());
        let gateways = GatewayDirectory::new(Arc::new(instances.clone()), config.gateway.clone());
        let store = Arc::new(DbCampaignStateStore::new(db_pool.clone()));

        let country_code = config.dispatch.default_country_code.clone();
        let dispatcher = CampaignDispatcher::new(store.clone(), gateways, gateway)
            .with_country_code(country_code.clone());
        let manager = CampaignManager::new(&db_pool, store, Arc::new(dispatcher));

        Self {
            db_pool,
            config: Arc::new(config),
            instances,
            manager: Arc::new(manager),
            parser: ContactListParser::new(country_code),
        }
    }
}

/// Authenticated context extracted from API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The user this API key belongs to
    pub user_id: UserId,
    /// API key ID for audit logging
    pub api_key_id: ApiKeyId,
}

impl AuthContext {
    /// Check if the caller owns a resource
    pub fn owns(&self, owner: UserId) -> bool {
        self.user_id == owner
    }
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim());
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

/// Extract the prefix from an API key (first 8 characters)
fn extract_key_prefix(api_key: &str) -> Option<&str> {
    api_key.get(..8)
}

/// Hash an API key for storage and comparison
pub fn hash_api_key(api_key: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a stored hash.
///
/// Accepts Argon2 hashes (`$argon2...`) as well as SHA-256 hex digests.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key) == stored_hash
}

/// Validate an API key against the database
async fn validate_api_key(db_pool: &DatabasePool, api_key: &str) -> Result<ApiKey, StatusCode> {
    let prefix = extract_key_prefix(api_key).ok_or_else(|| {
        warn!("API key too short");
        StatusCode::UNAUTHORIZED
    })?;

    let repo = ApiKeyRepository::new(db_pool.clone());

    let candidates = repo.find_by_prefix(prefix).await.map_err(|e| {
        error!("Database error while looking up API key: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if candidates.is_empty() {
        warn!("No API key found with prefix: {}", prefix);
        return Err(StatusCode::UNAUTHORIZED);
    }

    for candidate in candidates {
        if verify_api_key(api_key, &candidate.key_hash) {
            if candidate.is_expired() {
                warn!("API key {} has expired", candidate.id);
                return Err(StatusCode::UNAUTHORIZED);
            }

            // Don't fail auth on this
            let key_id = candidate.id;
            tokio::spawn(async move {
                if let Err(e) = repo.update_last_used(key_id).await {
                    error!("Failed to update API key last_used_at: {}", e);
                }
            });

            debug!(
                "API key {} authenticated for user {}",
                candidate.id, candidate.user_id
            );
            return Ok(candidate);
        }
    }

    warn!("API key hash mismatch for prefix: {}", prefix);
    Err(StatusCode::UNAUTHORIZED)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path().starts_with("/health") {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!("Missing API key in request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    let validated_key = validate_api_key(&state.db_pool, api_key).await?;

    request.extensions_mut().insert(AuthContext {
        user_id: validated_key.user_id,
        api_key_id: validated_key.id,
    });

    Ok(next.run(request).await)
}

/// Check that the caller owns a resource. Foreign resources are reported
/// as missing so their existence is not disclosed.
pub fn require_owner(auth_context: &AuthContext, owner: UserId) -> Result<(), StatusCode> {
    if !auth_context.owns(owner) {
        warn!(
            "Access denied: API key {} does not own the requested resource",
            auth_context.api_key_id
        );
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(())
}
