use std::sync::Arc;

use axum::{
    Json,
    extract::{OriginalUri, Path, State},
    http::{Method, StatusCode},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::info;

use super::{ApiJson, ApiQuery};
use crate::{
    AppState,
    auth::Auth,
    entities::{
        review,
        user::{self, Role},
    },
    error::{AppError, AppResult, FieldErrors, unique_violation},
    models::{UserPayload, UserView},
    pagination::{Page, PageParams, fetch_page},
    permissions::{self, Resource},
    rating,
    validators::{PERSON_NAME_MAX_LEN, validate_email, validate_max_len, validate_username},
};

#[derive(Debug, Default, Deserialize)]
pub struct UserSearch {
    pub search: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    OriginalUri(uri): OriginalUri,
    ApiQuery(page): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<UserSearch>,
) -> AppResult<Json<Page<UserView>>> {
    permissions::check(auth.actor(), &Method::GET, Resource::Users)?;

    let mut query = user::Entity::find().order_by_asc(user::Column::Username);
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        query = query.filter(user::Column::Username.contains(term));
    }

    let (count, users) = fetch_page(query, &state.db, &page, state.config.page_size).await?;
    let results = users.iter().map(UserView::from).collect();
    Ok(Json(Page::new(&uri, &page, state.config.page_size, count, results)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    ApiJson(payload): ApiJson<UserPayload>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    permissions::check(auth.actor(), &Method::POST, Resource::Users)?;

    let username = payload.username.as_deref().map(str::trim).unwrap_or_default().to_string();
    let email = payload.email.as_deref().map(str::trim).unwrap_or_default().to_string();

    let mut errors = FieldErrors::new();
    errors.check("username", validate_username(&username));
    errors.check("email", validate_email(&email));
    check_person_names(&mut errors, &payload);
    if errors.get("username").is_none()
        && taken(&state.db, user::Column::Username, &username, None).await?
    {
        errors.add("username", "a user with this username already exists");
    }
    if errors.get("email").is_none() && taken(&state.db, user::Column::Email, &email, None).await? {
        errors.add("email", "a user with this email already exists");
    }
    errors.into_result()?;

    let active = user::ActiveModel {
        username: Set(username),
        email: Set(email),
        first_name: Set(payload.first_name.unwrap_or_default()),
        last_name: Set(payload.last_name.unwrap_or_default()),
        bio: Set(payload.bio),
        role: Set(Role::effective(payload.role.unwrap_or(Role::User), false, false)),
        is_staff: Set(false),
        is_superuser: Set(false),
        confirmation_code: Set(String::new()),
        date_joined: Set(crate::now_sec()),
        ..Default::default()
    };
    let created = active.insert(&state.db).await.map_err(unique_to_field)?;

    info!(username = %created.username, role = ?created.role, "user created");
    Ok((StatusCode::CREATED, Json(UserView::from(&created))))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(username): Path<String>,
) -> AppResult<Json<UserView>> {
    permissions::check(auth.actor(), &Method::GET, Resource::Users)?;
    let found = find_by_username(&state.db, &username).await?;
    Ok(Json(UserView::from(&found)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(username): Path<String>,
    ApiJson(payload): ApiJson<UserPayload>,
) -> AppResult<Json<UserView>> {
    permissions::check(auth.actor(), &Method::PATCH, Resource::Users)?;
    let found = find_by_username(&state.db, &username).await?;
    let updated = apply_patch(&state, found, payload, true).await?;
    Ok(Json(UserView::from(&updated)))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(username): Path<String>,
) -> AppResult<StatusCode> {
    permissions::check(auth.actor(), &Method::DELETE, Resource::Users)?;
    let found = find_by_username(&state.db, &username).await?;

    let txn = state.db.begin().await?;

    // Reviews cascade away with the account; their titles need new ratings.
    let mut title_ids: Vec<i32> = review::Entity::find()
        .filter(review::Column::AuthorId.eq(found.id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|r| r.title_id)
        .collect();
    title_ids.sort_unstable();
    title_ids.dedup();

    user::Entity::delete_by_id(found.id).exec(&txn).await?;
    for title_id in title_ids {
        rating::refresh_rating(&txn, title_id).await?;
    }

    txn.commit().await?;

    info!(username = %found.username, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<Arc<AppState>>, auth: Auth) -> AppResult<Json<UserView>> {
    let actor = auth.require()?;
    let found =
        user::Entity::find_by_id(actor.id).one(&state.db).await?.ok_or(AppError::Unauthorized)?;
    Ok(Json(UserView::from(&found)))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    ApiJson(payload): ApiJson<UserPayload>,
) -> AppResult<Json<UserView>> {
    let actor = auth.require()?;
    let found =
        user::Entity::find_by_id(actor.id).one(&state.db).await?.ok_or(AppError::Unauthorized)?;
    let updated = apply_patch(&state, found, payload, false).await?;
    Ok(Json(UserView::from(&updated)))
}

/// Partial update shared by the admin and self-service endpoints. Only admins
/// may change a role; on `/users/me/` the field is ignored.
async fn apply_patch(
    state: &AppState,
    current: user::Model,
    payload: UserPayload,
    allow_role: bool,
) -> AppResult<user::Model> {
    let username = payload.username.as_deref().map(str::trim);
    let email = payload.email.as_deref().map(str::trim);

    let mut errors = FieldErrors::new();
    if let Some(username) = username {
        errors.check("username", validate_username(username));
        if errors.get("username").is_none()
            && taken(&state.db, user::Column::Username, username, Some(current.id)).await?
        {
            errors.add("username", "a user with this username already exists");
        }
    }
    if let Some(email) = email {
        errors.check("email", validate_email(email));
        if errors.get("email").is_none()
            && taken(&state.db, user::Column::Email, email, Some(current.id)).await?
        {
            errors.add("email", "a user with this email already exists");
        }
    }
    check_person_names(&mut errors, &payload);
    errors.into_result()?;

    let (is_staff, is_superuser) = (current.is_staff, current.is_superuser);
    let mut active: user::ActiveModel = current.clone().into();
    if let Some(username) = username {
        active.username = Set(username.to_string());
    }
    if let Some(email) = email {
        active.email = Set(email.to_string());
    }
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(last_name);
    }
    if let Some(bio) = payload.bio {
        active.bio = Set(Some(bio));
    }
    if let Some(role) = payload.role.filter(|_| allow_role) {
        active.role = Set(Role::effective(role, is_staff, is_superuser));
    }

    if !active.is_changed() {
        return Ok(current);
    }

    let updated = active.update(&state.db).await.map_err(unique_to_field)?;
    info!(username = %updated.username, "user updated");
    Ok(updated)
}

fn check_person_names(errors: &mut FieldErrors, payload: &UserPayload) {
    if let Some(first_name) = &payload.first_name {
        errors.check("first_name", validate_max_len(first_name, PERSON_NAME_MAX_LEN));
    }
    if let Some(last_name) = &payload.last_name {
        errors.check("last_name", validate_max_len(last_name, PERSON_NAME_MAX_LEN));
    }
}

async fn find_by_username<C: ConnectionTrait>(conn: &C, username: &str) -> AppResult<user::Model> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("user"))
}

async fn taken<C: ConnectionTrait>(
    conn: &C,
    column: user::Column,
    value: &str,
    except: Option<i32>,
) -> Result<bool, DbErr> {
    let mut query = user::Entity::find().filter(column.eq(value));
    if let Some(id) = except {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.one(conn).await?.is_some())
}

fn unique_to_field(err: DbErr) -> AppError {
    unique_violation(err, &["username", "email"], "a user with this value already exists")
}
