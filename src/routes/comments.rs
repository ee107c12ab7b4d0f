use std::sync::Arc;

use axum::{
    Json,
    extract::{OriginalUri, Path, State},
    http::{Method, StatusCode},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tracing::info;

use super::{ApiJson, ApiQuery, author_name, reviews::find_review, usernames};
use crate::{
    AppState,
    auth::Auth,
    entities::comment,
    error::{AppError, AppResult, FieldErrors},
    models::{CommentPayload, CommentView},
    pagination::{Page, PageParams, fetch_page},
    permissions::{self, Resource},
    validators::ValidationError,
};

pub async fn list(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Path((title_id, review_id)): Path<(i32, i32)>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> AppResult<Json<Page<CommentView>>> {
    find_review(&state.db, title_id, review_id).await?;

    let query = comment::Entity::find()
        .filter(comment::Column::ReviewId.eq(review_id))
        .order_by_desc(comment::Column::PubDate)
        .order_by_desc(comment::Column::Id);

    let (count, rows) = fetch_page(query, &state.db, &page, state.config.page_size).await?;
    let names = usernames(&state.db, rows.iter().map(|c| c.author_id)).await?;
    let results = rows
        .iter()
        .map(|c| CommentView::new(c, author_name(&names, c.author_id)))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(Page::new(&uri, &page, state.config.page_size, count, results)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((title_id, review_id)): Path<(i32, i32)>,
    ApiJson(payload): ApiJson<CommentPayload>,
) -> AppResult<(StatusCode, Json<CommentView>)> {
    let actor = auth.require()?;
    permissions::check(Some(&actor), &Method::POST, Resource::Contributions)?;
    find_review(&state.db, title_id, review_id).await?;

    let text = payload.text.unwrap_or_default();
    if text.trim().is_empty() {
        let mut errors = FieldErrors::new();
        errors.check("text", Err(ValidationError::Required));
        errors.into_result()?;
    }

    let created = comment::ActiveModel {
        review_id: Set(review_id),
        author_id: Set(actor.id),
        text: Set(text),
        pub_date: Set(crate::now_sec()),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    info!(review_id = review_id, comment_id = created.id, author = %actor.username, "comment created");
    Ok((StatusCode::CREATED, Json(CommentView::new(&created, &actor.username)?)))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path((title_id, review_id, comment_id)): Path<(i32, i32, i32)>,
) -> AppResult<Json<CommentView>> {
    let found = find_comment(&state, title_id, review_id, comment_id).await?;
    let names = usernames(&state.db, [found.author_id]).await?;
    Ok(Json(CommentView::new(&found, author_name(&names, found.author_id))?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((title_id, review_id, comment_id)): Path<(i32, i32, i32)>,
    ApiJson(payload): ApiJson<CommentPayload>,
) -> AppResult<Json<CommentView>> {
    let actor = auth.require()?;
    let found = find_comment(&state, title_id, review_id, comment_id).await?;
    permissions::check_owned(&actor, &Method::PATCH, &found)?;

    let updated = match payload.text {
        Some(text) if text.trim().is_empty() => {
            return Err(AppError::field("text", ValidationError::Required.to_string()));
        },
        Some(text) => {
            let mut active: comment::ActiveModel = found.into();
            active.text = Set(text);
            active.update(&state.db).await?
        },
        None => found,
    };

    info!(comment_id = updated.id, by = %actor.username, "comment updated");
    let names = usernames(&state.db, [updated.author_id]).await?;
    Ok(Json(CommentView::new(&updated, author_name(&names, updated.author_id))?))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((title_id, review_id, comment_id)): Path<(i32, i32, i32)>,
) -> AppResult<StatusCode> {
    let actor = auth.require()?;
    let found = find_comment(&state, title_id, review_id, comment_id).await?;
    permissions::check_owned(&actor, &Method::DELETE, &found)?;

    comment::Entity::delete_by_id(found.id).exec(&state.db).await?;

    info!(comment_id = found.id, by = %actor.username, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_comment(
    state: &AppState,
    title_id: i32,
    review_id: i32,
    comment_id: i32,
) -> AppResult<comment::Model> {
    find_review(&state.db, title_id, review_id).await?;
    comment::Entity::find_by_id(comment_id)
        .filter(comment::Column::ReviewId.eq(review_id))
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("comment"))
}
