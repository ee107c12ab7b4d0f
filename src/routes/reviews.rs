use std::sync::Arc;

use axum::{
    Json,
    extract::{OriginalUri, Path, State},
    http::{Method, StatusCode},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::info;

use super::{ApiJson, ApiQuery, author_name, titles::find_title, usernames};
use crate::{
    AppState,
    auth::Auth,
    entities::review,
    error::{AppError, AppResult, FieldErrors, NON_FIELD_ERRORS, unique_violation},
    models::{ReviewPayload, ReviewView},
    pagination::{Page, PageParams, fetch_page},
    permissions::{self, Resource},
    rating,
    validators::{ValidationError, validate_score},
};

const DUPLICATE_REVIEW: &str = "you have already reviewed this title";

pub async fn list(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Path(title_id): Path<i32>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> AppResult<Json<Page<ReviewView>>> {
    find_title(&state.db, title_id).await?;

    let query = review::Entity::find()
        .filter(review::Column::TitleId.eq(title_id))
        .order_by_desc(review::Column::PubDate)
        .order_by_desc(review::Column::Id);

    let (count, rows) = fetch_page(query, &state.db, &page, state.config.page_size).await?;
    let names = usernames(&state.db, rows.iter().map(|r| r.author_id)).await?;
    let results = rows
        .iter()
        .map(|r| ReviewView::new(r, author_name(&names, r.author_id)))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(Page::new(&uri, &page, state.config.page_size, count, results)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(title_id): Path<i32>,
    ApiJson(payload): ApiJson<ReviewPayload>,
) -> AppResult<(StatusCode, Json<ReviewView>)> {
    let actor = auth.require()?;
    permissions::check(Some(&actor), &Method::POST, Resource::Contributions)?;
    find_title(&state.db, title_id).await?;

    let mut errors = FieldErrors::new();
    let text = payload.text.unwrap_or_default();
    if text.trim().is_empty() {
        errors.check("text", Err(ValidationError::Required));
    }
    match payload.score {
        Some(score) => errors.check("score", validate_score(score)),
        None => errors.check("score", Err(ValidationError::Required)),
    }
    errors.into_result()?;

    let txn = state.db.begin().await?;

    let existing = review::Entity::find()
        .filter(review::Column::TitleId.eq(title_id))
        .filter(review::Column::AuthorId.eq(actor.id))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(AppError::field(NON_FIELD_ERRORS, DUPLICATE_REVIEW));
    }

    let created = review::ActiveModel {
        title_id: Set(title_id),
        author_id: Set(actor.id),
        text: Set(text),
        score: Set(payload.score.unwrap_or_default()),
        pub_date: Set(crate::now_sec()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|err| unique_violation(err, &[], DUPLICATE_REVIEW))?;
    let rating = rating::refresh_rating(&txn, title_id).await?;

    txn.commit().await?;

    info!(title_id = title_id, review_id = created.id, author = %actor.username, rating = ?rating, "review created");
    Ok((StatusCode::CREATED, Json(ReviewView::new(&created, &actor.username)?)))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path((title_id, review_id)): Path<(i32, i32)>,
) -> AppResult<Json<ReviewView>> {
    let found = find_review(&state.db, title_id, review_id).await?;
    let names = usernames(&state.db, [found.author_id]).await?;
    Ok(Json(ReviewView::new(&found, author_name(&names, found.author_id))?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((title_id, review_id)): Path<(i32, i32)>,
    ApiJson(payload): ApiJson<ReviewPayload>,
) -> AppResult<Json<ReviewView>> {
    let actor = auth.require()?;
    let found = find_review(&state.db, title_id, review_id).await?;
    permissions::check_owned(&actor, &Method::PATCH, &found)?;

    let mut errors = FieldErrors::new();
    if let Some(text) = &payload.text {
        if text.trim().is_empty() {
            errors.check("text", Err(ValidationError::Required));
        }
    }
    if let Some(score) = payload.score {
        errors.check("score", validate_score(score));
    }
    errors.into_result()?;

    let txn = state.db.begin().await?;
    let mut active: review::ActiveModel = found.clone().into();
    if let Some(text) = payload.text {
        active.text = Set(text);
    }
    if let Some(score) = payload.score {
        active.score = Set(score);
    }
    let updated = if active.is_changed() { active.update(&txn).await? } else { found };
    rating::refresh_rating(&txn, title_id).await?;
    txn.commit().await?;

    info!(review_id = updated.id, by = %actor.username, "review updated");
    let names = usernames(&state.db, [updated.author_id]).await?;
    Ok(Json(ReviewView::new(&updated, author_name(&names, updated.author_id))?))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((title_id, review_id)): Path<(i32, i32)>,
) -> AppResult<StatusCode> {
    let actor = auth.require()?;
    let found = find_review(&state.db, title_id, review_id).await?;
    permissions::check_owned(&actor, &Method::DELETE, &found)?;

    let txn = state.db.begin().await?;
    review::Entity::delete_by_id(found.id).exec(&txn).await?;
    let rating = rating::refresh_rating(&txn, title_id).await?;
    txn.commit().await?;

    info!(review_id = found.id, by = %actor.username, rating = ?rating, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// The review `review_id` under title `title_id`; 404 when either is missing
/// or the review belongs to another title.
pub(super) async fn find_review<C: ConnectionTrait>(
    conn: &C,
    title_id: i32,
    review_id: i32,
) -> AppResult<review::Model> {
    find_title(conn, title_id).await?;
    review::Entity::find_by_id(review_id)
        .filter(review::Column::TitleId.eq(title_id))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("review"))
}
