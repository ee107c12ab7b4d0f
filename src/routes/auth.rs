use std::sync::Arc;

use axum::{Json, extract::State};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tracing::{debug, info};

use super::ApiJson;
use crate::{
    AppState,
    auth::{AuthThrottle, deliver_confirmation_code, generate_confirmation_code},
    entities::user::{self, Role},
    error::{AppError, AppResult, FieldErrors, unique_violation},
    models::{SignupRequest, SignupResponse, TokenRequest, TokenResponse},
    validators::{validate_email, validate_username},
};

pub async fn signup(
    State(state): State<Arc<AppState>>,
    _throttle: AuthThrottle,
    ApiJson(req): ApiJson<SignupRequest>,
) -> AppResult<Json<SignupResponse>> {
    let email = req.email.trim().to_string();
    let username = req.username.trim().to_string();

    let mut errors = FieldErrors::new();
    errors.check("email", validate_email(&email));
    errors.check("username", validate_username(&username));
    errors.into_result()?;

    let by_username =
        user::Entity::find().filter(user::Column::Username.eq(username.as_str())).one(&state.db).await?;
    let by_email =
        user::Entity::find().filter(user::Column::Email.eq(email.as_str())).one(&state.db).await?;

    let code = generate_confirmation_code();
    let account = match (by_username, by_email) {
        (Some(existing), Some(same)) if existing.id == same.id => {
            debug!(username = %username, "re-issuing confirmation code");
            let mut active: user::ActiveModel = existing.into();
            active.confirmation_code = Set(code);
            active.update(&state.db).await?
        },
        (None, None) => {
            let active = user::ActiveModel {
                username: Set(username.clone()),
                email: Set(email.clone()),
                first_name: Set(String::new()),
                last_name: Set(String::new()),
                bio: Set(None),
                role: Set(Role::User),
                is_staff: Set(false),
                is_superuser: Set(false),
                confirmation_code: Set(code),
                date_joined: Set(crate::now_sec()),
                ..Default::default()
            };
            let created = active.insert(&state.db).await.map_err(|err| {
                unique_violation(err, &["username", "email"], "a user with this value already exists")
            })?;
            info!(username = %created.username, "user signed up");
            created
        },
        (username_owner, email_owner) => {
            let mut errors = FieldErrors::new();
            if username_owner.is_some() {
                errors.add("username", "this username is registered with another email");
            }
            if email_owner.is_some() {
                errors.add("email", "this email is registered with another username");
            }
            return Err(AppError::Validation(errors));
        },
    };

    deliver_confirmation_code(&account);

    Ok(Json(SignupResponse { email: account.email, username: account.username }))
}

pub async fn token(
    State(state): State<Arc<AppState>>,
    _throttle: AuthThrottle,
    ApiJson(req): ApiJson<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let username = req.username.trim();
    if let Err(err) = validate_username(username) {
        return Err(AppError::field("username", err.to_string()));
    }

    let account = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let code = req.confirmation_code.trim();
    if code.is_empty() {
        return Err(AppError::field("confirmation_code", "this field is required"));
    }
    if account.confirmation_code.is_empty() || account.confirmation_code != code {
        debug!(username = %username, "wrong confirmation code");
        return Err(AppError::field("confirmation_code", "invalid confirmation code"));
    }

    let token = state.tokens.issue(&account)?;

    let mut active: user::ActiveModel = account.into();
    active.confirmation_code = Set(String::new());
    let account = active.update(&state.db).await?;

    info!(username = %account.username, "access token issued");
    Ok(Json(TokenResponse { token }))
}
