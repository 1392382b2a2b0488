use axum::http::HeaderMap;
use cookie::Cookie;
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::stores::ProjectDirectory;

// Membership lookups are cached briefly so a chatty reconnect loop does
// not hammer the directory.
const ROLE_CACHE_CAPACITY: u64 = 10_000;
const ROLE_CACHE_IDLE: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("token has no subject claim")]
    MissingSubject,
    #[error("user {user_id} is not a member of project {project_id}")]
    Forbidden { user_id: String, project_id: String },
    #[error("membership lookup failed: {0}")]
    Directory(#[from] crate::stores::StoreError),
}

/// Validate a JWT token
///
/// # Arguments
/// * `token` - JWT token string
/// * `secret` - Secret key for validation
///
/// # Returns
/// * `Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error>` - Token data or error
pub fn validate_jwt(
    token: &str,
    secret: &str,
) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<serde_json::Value>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
}

/// Extract the auth token for a handshake.
///
/// Precedence: explicit `token` query parameter, then the Authorization
/// bearer header, then the `auth_token` cookie. Browser WebSocket clients
/// cannot set headers, so the query parameter comes first.
pub fn extract_token(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query_token {
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    if let Some(auth_header) = headers.get("authorization") {
        if let Ok(value) = auth_header.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get("cookie") {
        if let Ok(value) = cookie_header.to_str() {
            for pair in Cookie::split_parse(value.to_string()).flatten() {
                if pair.name() == "auth_token" {
                    return Some(pair.value().to_string());
                }
            }
        }
    }

    None
}

/// An authenticated, project-authorized user.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: String,
    pub roles: Vec<String>,
}

/// Admission gate for incoming connections: token validity plus project
/// membership, with a short-lived role cache in front of the directory.
pub struct AuthGate {
    jwt_secret: String,
    directory: Arc<dyn ProjectDirectory>,
    role_cache: Cache<String, Vec<String>>,
}

impl AuthGate {
    pub fn new(jwt_secret: String, directory: Arc<dyn ProjectDirectory>) -> Self {
        Self {
            jwt_secret,
            directory,
            role_cache: Cache::builder()
                .max_capacity(ROLE_CACHE_CAPACITY)
                .time_to_idle(ROLE_CACHE_IDLE)
                .build(),
        }
    }

    /// Authenticate a token and authorize the user for a project.
    ///
    /// The user id comes from the token's `sub` claim (`userId` accepted as
    /// a fallback). Membership roles come from the project directory; roles
    /// carried in the token's `roles` claim are merged in.
    pub async fn authorize(&self, token: &str, project_id: &str) -> Result<AuthedUser, AuthError> {
        let token_data = validate_jwt(token, &self.jwt_secret).map_err(|e| {
            warn!("Rejected connection token: {}", e);
            e
        })?;
        let claims = token_data.claims;

        let user_id = claims
            .get("sub")
            .or_else(|| claims.get("userId"))
            .and_then(|v| v.as_str())
            .ok_or(AuthError::MissingSubject)?
            .to_string();

        let cache_key = format!("{}/{}", project_id, user_id);
        let mut roles = match self.role_cache.get(&cache_key) {
            Some(roles) => {
                debug!("Role cache hit for {}", cache_key);
                roles
            }
            None => {
                let roles = self.directory.member_roles(project_id, &user_id).await?;
                self.role_cache.insert(cache_key, roles.clone());
                roles
            }
        };

        if roles.is_empty() {
            return Err(AuthError::Forbidden {
                user_id,
                project_id: project_id.to_string(),
            });
        }

        if let Some(claim_roles) = claims.get("roles").and_then(|v| v.as_array()) {
            for role in claim_roles.iter().filter_map(|r| r.as_str()) {
                if !roles.iter().any(|have| have == role) {
                    roles.push(role.to_string());
                }
            }
        }

        Ok(AuthedUser { user_id, roles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::StaticProjectDirectory;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token_for(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn claims(sub: &str) -> serde_json::Value {
        serde_json::json!({
            "sub": sub,
            "exp": chrono::Utc::now().timestamp() + 3600,
        })
    }

    fn gate_with(dir: StaticProjectDirectory) -> AuthGate {
        AuthGate::new(SECRET.to_string(), Arc::new(dir))
    }

    #[tokio::test]
    async fn admits_project_member() {
        let dir = StaticProjectDirectory::new();
        dir.grant("proj-1", "user-a", &["editor"]);
        let gate = gate_with(dir);

        let user = gate
            .authorize(&token_for(claims("user-a")), "proj-1")
            .await
            .unwrap();
        assert_eq!(user.user_id, "user-a");
        assert_eq!(user.roles, vec!["editor".to_string()]);
    }

    #[tokio::test]
    async fn rejects_non_member() {
        let dir = StaticProjectDirectory::new();
        dir.grant("proj-1", "user-a", &["editor"]);
        let gate = gate_with(dir);

        let err = gate
            .authorize(&token_for(claims("user-b")), "proj-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn rejects_bad_signature() {
        let gate = gate_with(StaticProjectDirectory::allow_all());
        let forged = encode(
            &Header::default(),
            &claims("user-a"),
            &EncodingKey::from_secret(b"wrong-secret"),
        )
        .unwrap();
        let err = gate.authorize(&forged, "proj-1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let gate = gate_with(StaticProjectDirectory::allow_all());
        let expired = token_for(serde_json::json!({
            "sub": "user-a",
            "exp": chrono::Utc::now().timestamp() - 3600,
        }));
        let err = gate.authorize(&expired, "proj-1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn token_extraction_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer header-token".parse().unwrap());
        headers.insert("cookie", "auth_token=cookie-token; theme=dark".parse().unwrap());

        assert_eq!(
            extract_token(Some("query-token"), &headers).as_deref(),
            Some("query-token")
        );
        assert_eq!(
            extract_token(None, &headers).as_deref(),
            Some("header-token")
        );

        headers.remove("authorization");
        assert_eq!(
            extract_token(None, &headers).as_deref(),
            Some("cookie-token")
        );

        headers.remove("cookie");
        assert_eq!(extract_token(None, &headers), None);
        assert_eq!(extract_token(Some(""), &headers), None);
    }

    #[tokio::test]
    async fn merges_token_roles_with_directory_roles() {
        let dir = StaticProjectDirectory::new();
        dir.grant("proj-1", "user-a", &["viewer"]);
        let gate = gate_with(dir);

        let token = token_for(serde_json::json!({
            "sub": "user-a",
            "exp": chrono::Utc::now().timestamp() + 3600,
            "roles": ["admin", "viewer"],
        }));
        let user = gate.authorize(&token, "proj-1").await.unwrap();
        assert_eq!(
            user.roles,
            vec!["viewer".to_string(), "admin".to_string()]
        );
    }
}
