//! Connection authentication.
//!
//! Runs once per connection at handshake. A missing or bad credential never
//! rejects the connection; it yields an unauthenticated [`ConnectionContext`]
//! and authenticated-only operations refuse later.

use std::sync::Arc;

use coachline_common::{AppError, AppResult, config::AuthConfig};
use coachline_db::repositories::UserRepository;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::views::UserSummary;

/// Claims carried by bearer tokens issued by the marketplace application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id.
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
    /// Issuer, checked only when one is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Why a bearer token was refused.
#[derive(Debug, Error)]
pub enum TokenError {
    /// `exp` is in the past, beyond the configured leeway.
    #[error("token expired")]
    Expired,
    /// Bad signature, malformed token or unusable claims.
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Resolves a bearer token to a user id.
pub trait TokenVerifier: Send + Sync {
    /// Check `token` and return the user id it was issued for.
    fn verify(&self, token: &str) -> Result<String, TokenError>;
}

/// HS256 verifier sharing a secret with the token issuer.
pub struct JwtTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    /// Verifier for the configured secret, issuer and leeway.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }
}

impl TokenVerifier for JwtTokenVerifier {
    fn verify(&self, token: &str) -> Result<String, TokenError> {
        let data = decode::<TokenClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;

        if data.claims.sub.is_empty() {
            return Err(TokenError::Invalid("empty subject".to_string()));
        }
        Ok(data.claims.sub)
    }
}

/// An active user bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Subject of the verified token.
    pub user_id: String,
    /// Sender details stamped on outgoing messages.
    pub summary: UserSummary,
}

/// Per-connection identity, fixed at handshake.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Process-local socket id, the key of room membership.
    pub connection_id: String,
    /// `None` when the handshake carried no usable token.
    pub user: Option<AuthenticatedUser>,
}

impl ConnectionContext {
    /// A context with no identity attached.
    #[must_use]
    pub const fn anonymous(connection_id: String) -> Self {
        Self {
            connection_id,
            user: None,
        }
    }

    /// Whether a user is attached.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Id of the attached user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_id.as_str())
    }

    /// The authenticated user, or [`AppError::Unauthenticated`].
    pub fn require_user(&self) -> AppResult<&AuthenticatedUser> {
        self.user.as_ref().ok_or(AppError::Unauthenticated)
    }
}

/// Builds a [`ConnectionContext`] from the handshake credential.
#[derive(Clone)]
pub struct ConnectionAuthenticator {
    verifier: Arc<dyn TokenVerifier>,
    user_repo: UserRepository,
}

impl ConnectionAuthenticator {
    /// Authenticator resolving token subjects through `user_repo`.
    #[must_use]
    pub fn new(verifier: Arc<dyn TokenVerifier>, user_repo: UserRepository) -> Self {
        Self {
            verifier,
            user_repo,
        }
    }

    /// Resolve the handshake token. Never fails.
    pub async fn authenticate(&self, connection_id: String, token: Option<&str>) -> ConnectionContext {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            debug!(connection_id = %connection_id, "Connection without token");
            return ConnectionContext::anonymous(connection_id);
        };

        let user_id = match self.verifier.verify(token) {
            Ok(user_id) => user_id,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Token rejected");
                return ConnectionContext::anonymous(connection_id);
            }
        };

        let user = match self.user_repo.find_by_id(&user_id).await {
            Ok(Some(user)) if user.is_active() => user,
            Ok(Some(_)) => {
                warn!(connection_id = %connection_id, user_id = %user_id, "Inactive user refused");
                return ConnectionContext::anonymous(connection_id);
            }
            Ok(None) => {
                warn!(connection_id = %connection_id, user_id = %user_id, "Token for unknown user");
                return ConnectionContext::anonymous(connection_id);
            }
            Err(e) => {
                warn!(connection_id = %connection_id, user_id = %user_id, error = %e, "User lookup failed");
                return ConnectionContext::anonymous(connection_id);
            }
        };

        debug!(connection_id = %connection_id, user_id = %user.id, "Connection authenticated");
        ConnectionContext {
            connection_id,
            user: Some(AuthenticatedUser {
                user_id: user.id.clone(),
                summary: UserSummary::from(&user),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coachline_db::entities::user;
    use coachline_db::entities::user::UserStatus;
    use coachline_db::test_utils::fixtures;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use sea_orm::{DatabaseBackend, MockDatabase};

    const SECRET: &str = "test-secret";

    fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: SECRET.to_string(),
            issuer: None,
            leeway_secs: 0,
        }
    }

    fn token(sub: &str, expires_in: i64) -> String {
        let claims = TokenClaims {
            sub: sub.to_string(),
            exp: (Utc::now().timestamp() + expires_in) as u64,
            iss: None,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn authenticator(users: Vec<Vec<user::Model>>) -> ConnectionAuthenticator {
        let db = std::sync::Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results(users)
                .into_connection(),
        );
        ConnectionAuthenticator::new(
            Arc::new(JwtTokenVerifier::new(&auth_config())),
            UserRepository::new(db),
        )
    }

    #[test]
    fn test_verifier_accepts_valid_token() {
        let verifier = JwtTokenVerifier::new(&auth_config());
        assert_eq!(verifier.verify(&token("user1", 3600)).unwrap(), "user1");
    }

    #[test]
    fn test_verifier_rejects_expired_and_garbage() {
        let verifier = JwtTokenVerifier::new(&auth_config());
        assert!(matches!(
            verifier.verify(&token("user1", -3600)),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            verifier.verify("not-a-token"),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_verifier_checks_issuer() {
        let verifier = JwtTokenVerifier::new(&AuthConfig {
            issuer: Some("marketplace".to_string()),
            ..auth_config()
        });
        assert!(verifier.verify(&token("user1", 3600)).is_err());
    }

    #[tokio::test]
    async fn test_no_token_is_anonymous() {
        let auth = authenticator(vec![]);
        let ctx = auth.authenticate("conn1".to_string(), None).await;
        assert!(!ctx.is_authenticated());
        assert!(matches!(ctx.require_user(), Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_valid_token_attaches_user() {
        let auth = authenticator(vec![vec![fixtures::user("user1", "Bo")]]);
        let ctx = auth
            .authenticate("conn1".to_string(), Some(&token("user1", 3600)))
            .await;

        let user = ctx.require_user().unwrap();
        assert_eq!(user.user_id, "user1");
        assert_eq!(user.summary.name, "Bo");
        assert_eq!(ctx.user_id(), Some("user1"));
    }

    #[tokio::test]
    async fn test_invalid_token_degrades() {
        let auth = authenticator(vec![]);
        let ctx = auth.authenticate("conn1".to_string(), Some("garbage")).await;
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn test_inactive_or_missing_user_degrades() {
        let mut inactive = fixtures::user("user1", "Bo");
        inactive.status = UserStatus::Suspended;

        let auth = authenticator(vec![vec![inactive], vec![]]);
        let ctx = auth
            .authenticate("conn1".to_string(), Some(&token("user1", 3600)))
            .await;
        assert!(!ctx.is_authenticated());

        let ctx = auth
            .authenticate("conn2".to_string(), Some(&token("user1", 3600)))
            .await;
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn test_lookup_failure_degrades() {
        // Empty mock buffer makes the lookup fail.
        let auth = authenticator(vec![]);
        let ctx = auth
            .authenticate("conn1".to_string(), Some(&token("user1", 3600)))
            .await;
        assert!(!ctx.is_authenticated());
    }
}
