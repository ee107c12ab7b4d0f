use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{
    entities::{category, comment, genre, review, user, user::Role},
    error::AppResult,
};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub email: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub confirmation_code: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Body of user create and partial update requests.
#[derive(Debug, Default, Deserialize)]
pub struct UserPayload {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub role: Role,
}

impl From<&user::Model> for UserView {
    fn from(u: &user::Model) -> Self {
        Self {
            username: u.username.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            bio: u.bio.clone(),
            role: Role::effective(u.role, u.is_staff, u.is_superuser),
        }
    }
}

/// Categories and genres share one shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugEntry {
    pub name: String,
    pub slug: String,
}

impl From<&category::Model> for SlugEntry {
    fn from(c: &category::Model) -> Self {
        Self { name: c.name.clone(), slug: c.slug.clone() }
    }
}

impl From<&genre::Model> for SlugEntry {
    fn from(g: &genre::Model) -> Self {
        Self { name: g.name.clone(), slug: g.slug.clone() }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SlugEntryPayload {
    pub name: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TitlePayload {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    /// Genre slugs.
    pub genre: Option<Vec<String>>,
    /// Category slug.
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TitleView {
    pub id: i32,
    pub name: String,
    pub year: i32,
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub genre: Vec<SlugEntry>,
    pub category: Option<SlugEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewPayload {
    pub text: Option<String>,
    pub score: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ReviewView {
    pub id: i32,
    pub text: String,
    pub author: String,
    pub score: i32,
    pub pub_date: Timestamp,
}

impl ReviewView {
    pub fn new(review: &review::Model, author: &str) -> AppResult<Self> {
        Ok(Self {
            id: review.id,
            text: review.text.clone(),
            author: author.to_string(),
            score: review.score,
            pub_date: Timestamp::from_second(review.pub_date)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentPayload {
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: i32,
    pub text: String,
    pub author: String,
    pub pub_date: Timestamp,
}

impl CommentView {
    pub fn new(comment: &comment::Model, author: &str) -> AppResult<Self> {
        Ok(Self {
            id: comment.id,
            text: comment.text.clone(),
            author: author.to_string(),
            pub_date: Timestamp::from_second(comment.pub_date)?,
        })
    }
}
