use axum::http::Uri;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QuerySelect, Select};
use serde::{Deserialize, Serialize};

pub const MAX_LIMIT: u64 = 100;
/// SQLite binds `OFFSET` as a signed 64-bit integer.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// `?limit=&offset=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl PageParams {
    pub fn limit(&self, default_limit: u64) -> u64 {
        self.limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0).min(MAX_OFFSET)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(uri: &Uri, params: &PageParams, default_limit: u64, count: u64, results: Vec<T>) -> Self {
        let limit = params.limit(default_limit);
        let offset = params.offset();

        let next_offset = offset.saturating_add(limit);
        let next = (next_offset < count).then(|| link(uri, limit, next_offset));
        let previous = (offset > 0).then(|| link(uri, limit, offset.saturating_sub(limit)));

        Self { count, next, previous, results }
    }
}

fn link(uri: &Uri, limit: u64, offset: u64) -> String {
    let mut pairs: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("limit=") && !p.starts_with("offset="))
        .map(str::to_string)
        .collect();
    pairs.push(format!("limit={limit}"));
    pairs.push(format!("offset={offset}"));
    format!("{}?{}", uri.path(), pairs.join("&"))
}

/// Total row count of `query` plus the requested window of it.
pub async fn fetch_page<E, C>(
    query: Select<E>,
    conn: &C,
    params: &PageParams,
    default_limit: u64,
) -> Result<(u64, Vec<E::Model>), DbErr>
where
    E: EntityTrait,
    E::Model: Sync + 'static,
    C: ConnectionTrait,
{
    let count = query.clone().count(conn).await?;
    let rows = query
        .offset(params.offset())
        .limit(params.limit(default_limit))
        .all(conn)
        .await?;
    Ok((count, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_links_forward_only() {
        let uri: Uri = "/api/v1/titles/?genre=drama".parse().unwrap();
        let params = PageParams { limit: Some(2), offset: None };
        let page = Page::new(&uri, &params, 10, 5, vec![1, 2]);
        assert_eq!(page.next.as_deref(), Some("/api/v1/titles/?genre=drama&limit=2&offset=2"));
        assert_eq!(page.previous, None);
    }

    #[test]
    fn last_page_links_backward_only() {
        let uri: Uri = "/api/v1/genres/?limit=2&offset=4".parse().unwrap();
        let params = PageParams { limit: Some(2), offset: Some(4) };
        let page = Page::new(&uri, &params, 10, 5, vec![5]);
        assert_eq!(page.next, None);
        assert_eq!(page.previous.as_deref(), Some("/api/v1/genres/?limit=2&offset=2"));
    }

    #[test]
    fn limit_is_clamped() {
        let params = PageParams { limit: Some(10_000), offset: None };
        assert_eq!(params.limit(10), MAX_LIMIT);
        assert_eq!(PageParams::default().limit(10), 10);
        assert_eq!(PageParams { limit: Some(0), offset: None }.limit(10), 1);
    }

    #[test]
    fn huge_offset_is_capped_and_has_no_next_page() {
        let params = PageParams { limit: Some(100), offset: Some(u64::MAX) };
        assert_eq!(params.offset(), MAX_OFFSET);

        let uri: Uri = "/api/v1/titles/".parse().unwrap();
        let page = Page::new(&uri, &params, 10, 3, Vec::<i32>::new());
        assert_eq!(page.next, None);
        assert!(page.previous.is_some());
    }
}
