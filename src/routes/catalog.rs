//! Categories and genres: listed by anyone, created and deleted by admins.

use std::sync::Arc;

use axum::{
    Json,
    extract::{OriginalUri, Path, State},
    http::{Method, StatusCode},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use tracing::info;

use super::{ApiJson, ApiQuery};
use crate::{
    AppState,
    auth::Auth,
    entities::{category, genre},
    error::{AppError, AppResult, FieldErrors, unique_violation},
    models::{SlugEntry, SlugEntryPayload},
    pagination::{Page, PageParams, fetch_page},
    permissions::{self, Resource},
    validators::{NAME_MAX_LEN, validate_required_text, validate_slug},
};

#[derive(Debug, Default, Deserialize)]
pub struct NameSearch {
    pub search: Option<String>,
}

impl NameSearch {
    fn term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    ApiQuery(page): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<NameSearch>,
) -> AppResult<Json<Page<SlugEntry>>> {
    let mut query = category::Entity::find().order_by_asc(category::Column::Name);
    if let Some(term) = filter.term() {
        query = query.filter(category::Column::Name.contains(term));
    }

    let (count, rows) = fetch_page(query, &state.db, &page, state.config.page_size).await?;
    let results = rows.iter().map(SlugEntry::from).collect();
    Ok(Json(Page::new(&uri, &page, state.config.page_size, count, results)))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    ApiJson(payload): ApiJson<SlugEntryPayload>,
) -> AppResult<(StatusCode, Json<SlugEntry>)> {
    permissions::check(auth.actor(), &Method::POST, Resource::Catalog)?;
    let entry = validate_entry(payload)?;

    let mut errors = FieldErrors::new();
    let name_taken = category::Entity::find()
        .filter(category::Column::Name.eq(entry.name.as_str()))
        .one(&state.db)
        .await?
        .is_some();
    if name_taken {
        errors.add("name", "a category with this name already exists");
    }
    let slug_taken = category::Entity::find()
        .filter(category::Column::Slug.eq(entry.slug.as_str()))
        .one(&state.db)
        .await?
        .is_some();
    if slug_taken {
        errors.add("slug", "a category with this slug already exists");
    }
    errors.into_result()?;

    let created = category::ActiveModel {
        name: Set(entry.name),
        slug: Set(entry.slug),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(duplicate_entry)?;

    info!(slug = %created.slug, "category created");
    Ok((StatusCode::CREATED, Json(SlugEntry::from(&created))))
}

pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    permissions::check(auth.actor(), &Method::DELETE, Resource::Catalog)?;

    let found = category::Entity::find()
        .filter(category::Column::Slug.eq(slug.as_str()))
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("category"))?;

    // Titles keep existing with no category.
    category::Entity::delete_by_id(found.id).exec(&state.db).await?;

    info!(slug = %found.slug, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_genres(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    ApiQuery(page): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<NameSearch>,
) -> AppResult<Json<Page<SlugEntry>>> {
    let mut query = genre::Entity::find().order_by_asc(genre::Column::Name);
    if let Some(term) = filter.term() {
        query = query.filter(genre::Column::Name.contains(term));
    }

    let (count, rows) = fetch_page(query, &state.db, &page, state.config.page_size).await?;
    let results = rows.iter().map(SlugEntry::from).collect();
    Ok(Json(Page::new(&uri, &page, state.config.page_size, count, results)))
}

pub async fn create_genre(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    ApiJson(payload): ApiJson<SlugEntryPayload>,
) -> AppResult<(StatusCode, Json<SlugEntry>)> {
    permissions::check(auth.actor(), &Method::POST, Resource::Catalog)?;
    let entry = validate_entry(payload)?;

    let mut errors = FieldErrors::new();
    let name_taken = genre::Entity::find()
        .filter(genre::Column::Name.eq(entry.name.as_str()))
        .one(&state.db)
        .await?
        .is_some();
    if name_taken {
        errors.add("name", "a genre with this name already exists");
    }
    let slug_taken = genre::Entity::find()
        .filter(genre::Column::Slug.eq(entry.slug.as_str()))
        .one(&state.db)
        .await?
        .is_some();
    if slug_taken {
        errors.add("slug", "a genre with this slug already exists");
    }
    errors.into_result()?;

    let created = genre::ActiveModel {
        name: Set(entry.name),
        slug: Set(entry.slug),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(duplicate_entry)?;

    info!(slug = %created.slug, "genre created");
    Ok((StatusCode::CREATED, Json(SlugEntry::from(&created))))
}

pub async fn delete_genre(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    permissions::check(auth.actor(), &Method::DELETE, Resource::Catalog)?;

    let found = genre::Entity::find()
        .filter(genre::Column::Slug.eq(slug.as_str()))
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("genre"))?;

    genre::Entity::delete_by_id(found.id).exec(&state.db).await?;

    info!(slug = %found.slug, "genre deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn validate_entry(payload: SlugEntryPayload) -> AppResult<SlugEntry> {
    let name = payload.name.unwrap_or_default().trim().to_string();
    let slug = payload.slug.unwrap_or_default().trim().to_string();

    let mut errors = FieldErrors::new();
    errors.check("name", validate_required_text(&name, NAME_MAX_LEN));
    errors.check("slug", validate_slug(&slug));
    errors.into_result()?;

    Ok(SlugEntry { name, slug })
}

fn duplicate_entry(err: DbErr) -> AppError {
    unique_violation(err, &["name", "slug"], "an entry with this value already exists")
}
