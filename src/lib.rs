pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod models;
pub mod pagination;
pub mod permissions;
pub mod rating;
pub mod routes;
pub mod validators;

use std::{net::IpAddr, num::NonZeroU32, sync::Arc};

use axum::Router;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
};
use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth::TokenIssuer, config::Config};

/// Auth endpoint limiter, one bucket per client IP.
pub type AuthLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub tokens: TokenIssuer,
    pub auth_limiter: Arc<AuthLimiter>,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: DatabaseConnection) -> Self {
        let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl_hours);
        let rps = NonZeroU32::new(config.auth_rps).unwrap_or(NonZeroU32::MIN);
        let auth_limiter = Arc::new(RateLimiter::keyed(Quota::per_second(rps)));
        Self { config, db, tokens, auth_limiter }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api())
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http())
}

pub(crate) fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}
