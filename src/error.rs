use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use serde_json::json;

use crate::validators::ValidationError;

/// Key for errors that belong to the request as a whole.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field name to messages, rendered as the body of a 400 response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    /// Records `result` under `field` when it is a validation failure.
    pub fn check(&mut self, field: &str, result: Result<(), ValidationError>) {
        if let Err(err) = result {
            self.add(field, err.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.is_empty() { Ok(()) } else { Err(AppError::Validation(self)) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication credentials were not provided or are invalid")]
    Unauthorized,
    #[error("you do not have permission to perform this action")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("request was throttled")]
    Throttled,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Throttled => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<jiff::Error> for AppError {
    fn from(err: jiff::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(errors) => json!(errors),
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "request failed");
                json!({ "detail": "internal server error" })
            },
            other => json!({ "detail": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// True when the database rejected a write because of a unique index.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Turns a unique-index violation into a 400 under the first of `fields`
/// whose column the database names, or under [`NON_FIELD_ERRORS`] when none
/// matches. Any other error stays internal.
pub fn unique_violation(err: DbErr, fields: &[&str], message: &str) -> AppError {
    let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() else {
        return err.into();
    };
    let field = fields
        .iter()
        .copied()
        .find(|field| violated_column(&detail, field))
        .unwrap_or(NON_FIELD_ERRORS);
    AppError::field(field, message)
}

/// SQLite reports `UNIQUE constraint failed: table.column[, table.column]`.
fn violated_column(detail: &str, column: &str) -> bool {
    let columns = detail.rsplit_once(':').map_or(detail, |(_, columns)| columns);
    columns
        .split(',')
        .filter_map(|qualified| qualified.trim().rsplit('.').next())
        .any(|name| name == column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_messages_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("email", "required");
        errors.add("email", "too long");
        errors.check("username", Err(ValidationError::ReservedUsername));
        errors.check("year", Ok(()));

        assert_eq!(errors.get("email").map(<[String]>::len), Some(2));
        assert!(errors.get("username").is_some());
        assert!(errors.get("year").is_none());
        assert!(matches!(errors.into_result(), Err(AppError::Validation(_))));
    }

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("title").into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::field("score", "out of range").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Throttled.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn violated_column_reads_sqlite_detail() {
        let detail = "UNIQUE constraint failed: users.email";
        assert!(violated_column(detail, "email"));
        assert!(!violated_column(detail, "username"));

        let composite = "UNIQUE constraint failed: reviews.title_id, reviews.author_id";
        assert!(violated_column(composite, "author_id"));
        assert!(!violated_column(composite, "text"));
    }

    #[test]
    fn non_unique_errors_stay_internal() {
        let err = unique_violation(DbErr::RecordNotFound("x".into()), &["email"], "taken");
        assert!(matches!(err, AppError::Internal(_)));
    }

    async fn insert_user(
        db: &sea_orm::DatabaseConnection,
        username: &str,
        email: &str,
    ) -> Result<crate::entities::user::Model, DbErr> {
        use sea_orm::{ActiveModelTrait, Set};

        use crate::entities::user::{ActiveModel, Role};

        ActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            first_name: Set(String::new()),
            last_name: Set(String::new()),
            bio: Set(None),
            role: Set(Role::User),
            is_staff: Set(false),
            is_superuser: Set(false),
            confirmation_code: Set(String::new()),
            date_joined: Set(0),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    #[tokio::test]
    async fn unique_index_violations_map_to_the_offending_field() {
        let db = crate::db::connect_and_migrate("sqlite::memory:", 1).await.unwrap();
        insert_user(&db, "ann", "ann@example.com").await.unwrap();

        let err = insert_user(&db, "ann2", "ann@example.com").await.unwrap_err();
        assert!(is_unique_violation(&err));
        match unique_violation(err, &["username", "email"], "taken") {
            AppError::Validation(errors) => {
                assert!(errors.get("email").is_some());
                assert!(errors.get("username").is_none());
            },
            other => panic!("unexpected {other:?}"),
        }

        let err = insert_user(&db, "ann", "other@example.com").await.unwrap_err();
        match unique_violation(err, &[], "taken") {
            AppError::Validation(errors) => assert!(errors.get(NON_FIELD_ERRORS).is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
