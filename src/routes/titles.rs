use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    extract::{OriginalUri, Path, State},
    http::{Method, StatusCode},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
    sea_query::Query as SqlQuery,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ApiJson, ApiQuery};
use crate::{
    AppState,
    auth::Auth,
    entities::{category, genre, title, title_genre},
    error::{AppError, AppResult, FieldErrors},
    models::{SlugEntry, TitlePayload, TitleView},
    pagination::{Page, PageParams, fetch_page},
    permissions::{self, Resource},
    validators::{NAME_MAX_LEN, validate_required_text, validate_year},
};

#[derive(Debug, Default, Deserialize)]
pub struct TitleFilter {
    /// Genre slug.
    pub genre: Option<String>,
    /// Category slug.
    pub category: Option<String>,
    pub name: Option<String>,
    pub year: Option<i32>,
    pub search: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    ApiQuery(page): ApiQuery<PageParams>,
    ApiQuery(filter): ApiQuery<TitleFilter>,
) -> AppResult<Json<Page<TitleView>>> {
    debug!(filter = ?filter, "listing titles");

    let mut query = title::Entity::find()
        .order_by_asc(title::Column::Name)
        .order_by_asc(title::Column::Id);

    if let Some(slug) = non_empty(&filter.genre) {
        let genre_ids = SqlQuery::select()
            .column(genre::Column::Id)
            .from(genre::Entity)
            .and_where(genre::Column::Slug.eq(slug))
            .to_owned();
        let title_ids = SqlQuery::select()
            .column(title_genre::Column::TitleId)
            .from(title_genre::Entity)
            .and_where(title_genre::Column::GenreId.in_subquery(genre_ids))
            .to_owned();
        query = query.filter(title::Column::Id.in_subquery(title_ids));
    }
    if let Some(slug) = non_empty(&filter.category) {
        let category_ids = SqlQuery::select()
            .column(category::Column::Id)
            .from(category::Entity)
            .and_where(category::Column::Slug.eq(slug))
            .to_owned();
        query = query.filter(title::Column::CategoryId.in_subquery(category_ids));
    }
    if let Some(name) = non_empty(&filter.name) {
        query = query.filter(title::Column::Name.contains(name));
    }
    if let Some(term) = non_empty(&filter.search) {
        query = query.filter(title::Column::Name.contains(term));
    }
    if let Some(year) = filter.year {
        query = query.filter(title::Column::Year.eq(year));
    }

    let (count, rows) = fetch_page(query, &state.db, &page, state.config.page_size).await?;
    let results = title_views(&state.db, rows).await?;
    Ok(Json(Page::new(&uri, &page, state.config.page_size, count, results)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    ApiJson(payload): ApiJson<TitlePayload>,
) -> AppResult<(StatusCode, Json<TitleView>)> {
    permissions::check(auth.actor(), &Method::POST, Resource::Catalog)?;

    let mut errors = FieldErrors::new();
    let name = payload.name.as_deref().map(str::trim).unwrap_or_default().to_string();
    errors.check("name", validate_required_text(&name, NAME_MAX_LEN));
    match payload.year {
        Some(year) => errors.check("year", validate_year(year)),
        None => errors.add("year", "this field is required"),
    }
    let genre_ids = match &payload.genre {
        Some(slugs) => resolve_genres(&state.db, slugs, &mut errors).await?,
        None => {
            errors.add("genre", "this field is required");
            Vec::new()
        },
    };
    let category_id = match non_empty(&payload.category) {
        Some(slug) => resolve_category(&state.db, slug, &mut errors).await?,
        None => {
            errors.add("category", "this field is required");
            None
        },
    };
    errors.into_result()?;

    let txn = state.db.begin().await?;
    let created = title::ActiveModel {
        name: Set(name),
        year: Set(payload.year.unwrap_or_default()),
        description: Set(payload.description),
        category_id: Set(category_id),
        rating: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    link_genres(&txn, created.id, &genre_ids).await?;
    txn.commit().await?;

    info!(title_id = created.id, name = %created.name, "title created");
    let view = title_view(&state.db, created).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(title_id): Path<i32>,
) -> AppResult<Json<TitleView>> {
    let found = find_title(&state.db, title_id).await?;
    Ok(Json(title_view(&state.db, found).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(title_id): Path<i32>,
    ApiJson(payload): ApiJson<TitlePayload>,
) -> AppResult<Json<TitleView>> {
    permissions::check(auth.actor(), &Method::PATCH, Resource::Catalog)?;
    let found = find_title(&state.db, title_id).await?;

    let mut errors = FieldErrors::new();
    let name = payload.name.as_deref().map(str::trim);
    if let Some(name) = name {
        errors.check("name", validate_required_text(name, NAME_MAX_LEN));
    }
    if let Some(year) = payload.year {
        errors.check("year", validate_year(year));
    }
    let genre_ids = match &payload.genre {
        Some(slugs) => Some(resolve_genres(&state.db, slugs, &mut errors).await?),
        None => None,
    };
    let category_id = match &payload.category {
        Some(slug) => Some(resolve_category(&state.db, slug.trim(), &mut errors).await?),
        None => None,
    };
    errors.into_result()?;

    let txn = state.db.begin().await?;
    let mut active: title::ActiveModel = found.clone().into();
    if let Some(name) = name {
        active.name = Set(name.to_string());
    }
    if let Some(year) = payload.year {
        active.year = Set(year);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(category_id) = category_id {
        active.category_id = Set(category_id);
    }
    let updated = if active.is_changed() { active.update(&txn).await? } else { found };

    if let Some(genre_ids) = genre_ids {
        title_genre::Entity::delete_many()
            .filter(title_genre::Column::TitleId.eq(updated.id))
            .exec(&txn)
            .await?;
        link_genres(&txn, updated.id, &genre_ids).await?;
    }
    txn.commit().await?;

    info!(title_id = updated.id, "title updated");
    Ok(Json(title_view(&state.db, updated).await?))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(title_id): Path<i32>,
) -> AppResult<StatusCode> {
    permissions::check(auth.actor(), &Method::DELETE, Resource::Catalog)?;
    let found = find_title(&state.db, title_id).await?;

    // Genre links, reviews and their comments go with it.
    found.delete(&state.db).await?;

    info!(title_id = title_id, "title deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn find_title<C: ConnectionTrait>(
    conn: &C,
    title_id: i32,
) -> AppResult<title::Model> {
    title::Entity::find_by_id(title_id).one(conn).await?.ok_or(AppError::NotFound("title"))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Genre ids for `slugs`; unknown slugs are recorded under `genre`.
async fn resolve_genres<C: ConnectionTrait>(
    conn: &C,
    slugs: &[String],
    errors: &mut FieldErrors,
) -> AppResult<Vec<i32>> {
    if slugs.is_empty() {
        return Ok(Vec::new());
    }

    let found = genre::Entity::find()
        .filter(genre::Column::Slug.is_in(slugs.iter().map(String::as_str)))
        .all(conn)
        .await?;

    for slug in slugs {
        if !found.iter().any(|g| &g.slug == slug) {
            errors.add("genre", format!("genre with slug \"{slug}\" does not exist"));
        }
    }
    Ok(found.into_iter().map(|g| g.id).collect())
}

/// An empty slug clears the category.
async fn resolve_category<C: ConnectionTrait>(
    conn: &C,
    slug: &str,
    errors: &mut FieldErrors,
) -> AppResult<Option<i32>> {
    if slug.is_empty() {
        return Ok(None);
    }

    let found = category::Entity::find()
        .filter(category::Column::Slug.eq(slug))
        .one(conn)
        .await?;
    if found.is_none() {
        errors.add("category", format!("category with slug \"{slug}\" does not exist"));
    }
    Ok(found.map(|c| c.id))
}

async fn link_genres<C: ConnectionTrait>(conn: &C, title_id: i32, genre_ids: &[i32]) -> AppResult<()> {
    if genre_ids.is_empty() {
        return Ok(());
    }

    let links = genre_ids.iter().map(|&genre_id| title_genre::ActiveModel {
        title_id: Set(title_id),
        genre_id: Set(genre_id),
    });
    title_genre::Entity::insert_many(links).exec_without_returning(conn).await?;
    Ok(())
}

async fn title_view<C: ConnectionTrait>(conn: &C, found: title::Model) -> AppResult<TitleView> {
    let mut views = title_views(conn, vec![found]).await?;
    views.pop().ok_or(AppError::NotFound("title"))
}

/// Builds views for a page of titles with one query per related table.
async fn title_views<C: ConnectionTrait>(
    conn: &C,
    titles: Vec<title::Model>,
) -> AppResult<Vec<TitleView>> {
    if titles.is_empty() {
        return Ok(Vec::new());
    }

    let mut category_ids: Vec<i32> = titles.iter().filter_map(|t| t.category_id).collect();
    category_ids.sort_unstable();
    category_ids.dedup();
    let categories: HashMap<i32, category::Model> = if category_ids.is_empty() {
        HashMap::new()
    } else {
        category::Entity::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect()
    };

    let links = title_genre::Entity::find()
        .filter(title_genre::Column::TitleId.is_in(titles.iter().map(|t| t.id)))
        .all(conn)
        .await?;
    let mut genre_ids: Vec<i32> = links.iter().map(|l| l.genre_id).collect();
    genre_ids.sort_unstable();
    genre_ids.dedup();
    let genres: HashMap<i32, genre::Model> = if genre_ids.is_empty() {
        HashMap::new()
    } else {
        genre::Entity::find()
            .filter(genre::Column::Id.is_in(genre_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect()
    };

    let mut genres_by_title: HashMap<i32, Vec<SlugEntry>> = HashMap::new();
    for link in &links {
        if let Some(g) = genres.get(&link.genre_id) {
            genres_by_title.entry(link.title_id).or_default().push(SlugEntry::from(g));
        }
    }

    Ok(titles
        .into_iter()
        .map(|t| {
            let mut genre = genres_by_title.remove(&t.id).unwrap_or_default();
            genre.sort_by(|a, b| a.name.cmp(&b.name));
            TitleView {
                id: t.id,
                category: t.category_id.and_then(|id| categories.get(&id)).map(SlugEntry::from),
                name: t.name,
                year: t.year,
                rating: t.rating,
                description: t.description,
                genre,
            }
        })
        .collect())
}
