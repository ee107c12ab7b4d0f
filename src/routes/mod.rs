mod auth;
mod catalog;
mod comments;
mod reviews;
mod titles;
mod users;

use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    extract::{FromRequest, FromRequestParts},
    routing::{delete, get, post},
};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};

use crate::{AppState, entities::user, error::AppError};

pub fn api() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup/", post(auth::signup))
        .route("/auth/token/", post(auth::token))
        .route("/users/", get(users::list).post(users::create))
        .route("/users/me/", get(users::me).patch(users::update_me))
        .route(
            "/users/{username}/",
            get(users::retrieve).patch(users::update).delete(users::destroy),
        )
        .route("/categories/", get(catalog::list_categories).post(catalog::create_category))
        .route("/categories/{slug}/", delete(catalog::delete_category))
        .route("/genres/", get(catalog::list_genres).post(catalog::create_genre))
        .route("/genres/{slug}/", delete(catalog::delete_genre))
        .route("/titles/", get(titles::list).post(titles::create))
        .route(
            "/titles/{title_id}/",
            get(titles::retrieve).patch(titles::update).delete(titles::destroy),
        )
        .route("/titles/{title_id}/reviews/", get(reviews::list).post(reviews::create))
        .route(
            "/titles/{title_id}/reviews/{review_id}/",
            get(reviews::retrieve).patch(reviews::update).delete(reviews::destroy),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/",
            get(comments::list).post(comments::create),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
            get(comments::retrieve).patch(comments::update).delete(comments::destroy),
        )
}

/// JSON body extractor whose rejections render like every other API error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor with the same JSON rejections as [`ApiJson`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Usernames of the given user ids.
async fn usernames<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = i32>,
) -> Result<HashMap<i32, String>, DbErr> {
    let mut ids: Vec<i32> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users = user::Entity::find().filter(user::Column::Id.is_in(ids)).all(conn).await?;
    Ok(users.into_iter().map(|u| (u.id, u.username)).collect())
}

fn author_name(names: &HashMap<i32, String>, id: i32) -> &str {
    names.get(&id).map(String::as_str).unwrap_or_default()
}
