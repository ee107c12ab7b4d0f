//! Confirmation codes, JWT access tokens and the request extractor that turns
//! a bearer token back into an [`Actor`].

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    AppState,
    entities::user::{self, Role},
    error::{AppError, AppResult},
    permissions::Actor,
};

pub const CONFIRMATION_CODE_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds: ttl_hours.max(1) * 3_600,
        }
    }

    pub fn issue(&self, user: &user::Model) -> AppResult<String> {
        let now = crate::now_sec();
        let claims = Claims { sub: user.id.to_string(), iat: now, exp: now + self.ttl_seconds };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| AppError::Internal(anyhow::Error::new(err)))
    }

    /// Returns the user id the token was issued for.
    pub fn verify(&self, token: &str) -> AppResult<i32> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|err| {
            debug!(error = %err, "rejected access token");
            AppError::Unauthorized
        })?;
        data.claims.sub.parse().map_err(|_| AppError::Unauthorized)
    }
}

pub fn generate_confirmation_code() -> String {
    Uuid::new_v4().simple().to_string()[..CONFIRMATION_CODE_LEN].to_string()
}

/// Stand-in for mail delivery: the code goes to the log.
pub fn deliver_confirmation_code(user: &user::Model) {
    info!(
        username = %user.username,
        email = %user.email,
        confirmation_code = %user.confirmation_code,
        "confirmation code issued"
    );
}

/// Creates the superuser named in the configuration, or promotes an existing
/// account with that username, and issues it a fresh confirmation code.
pub async fn ensure_superuser(
    db: &DatabaseConnection,
    username: &str,
    email: &str,
) -> AppResult<user::Model> {
    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;

    let code = generate_confirmation_code();
    let admin = match existing {
        Some(found) => {
            let mut active: user::ActiveModel = found.into();
            active.is_staff = Set(true);
            active.is_superuser = Set(true);
            active.role = Set(Role::effective(Role::Admin, true, true));
            active.confirmation_code = Set(code);
            active.update(db).await?
        },
        None => {
            let active = user::ActiveModel {
                username: Set(username.to_string()),
                email: Set(email.to_string()),
                first_name: Set(String::new()),
                last_name: Set(String::new()),
                bio: Set(None),
                role: Set(Role::effective(Role::Admin, true, true)),
                is_staff: Set(true),
                is_superuser: Set(true),
                confirmation_code: Set(code),
                date_joined: Set(crate::now_sec()),
                ..Default::default()
            };
            active.insert(db).await?
        },
    };

    info!(username = %admin.username, "superuser ready");
    deliver_confirmation_code(&admin);
    Ok(admin)
}

/// The acting user, if the request carried a valid bearer token.
///
/// A missing header is an anonymous request; a malformed, expired or orphaned
/// token is rejected with 401.
pub struct Auth(pub Option<Actor>);

impl Auth {
    pub fn actor(&self) -> Option<&Actor> {
        self.0.as_ref()
    }

    pub fn require(self) -> AppResult<Actor> {
        self.0.ok_or(AppError::Unauthorized)
    }
}

impl FromRequestParts<Arc<AppState>> for Auth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Self(None));
        };

        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let user_id = state.tokens.verify(token)?;
        let user =
            user::Entity::find_by_id(user_id).one(&state.db).await?.ok_or(AppError::Unauthorized)?;

        Ok(Self(Some(Actor::from(&user))))
    }
}

/// Charges one request against the caller's share of the auth rate limit.
///
/// Callers are keyed by peer IP; connections served without peer info share
/// the unspecified address.
pub struct AuthThrottle;

impl FromRequestParts<Arc<AppState>> for AuthThrottle {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| addr.ip());

        if state.auth_limiter.check_key(&peer).is_err() {
            debug!(peer = %peer, "auth request throttled");
            return Err(AppError::Throttled);
        }
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(id: i32) -> user::Model {
        user::Model {
            id,
            username: "bob".to_string(),
            email: "bob@example.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            bio: None,
            role: Role::User,
            is_staff: false,
            is_superuser: false,
            confirmation_code: String::new(),
            date_joined: 0,
        }
    }

    #[test]
    fn issued_token_verifies_to_user_id() {
        let issuer = TokenIssuer::new("secret", 1);
        let token = issuer.issue(&sample_user(42)).unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), 42);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = TokenIssuer::new("one", 1).issue(&sample_user(1)).unwrap();
        let err = TokenIssuer::new("two", 1).verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[test]
    fn confirmation_codes_are_short_and_fresh() {
        let a = generate_confirmation_code();
        let b = generate_confirmation_code();
        assert_eq!(a.len(), CONFIRMATION_CODE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
