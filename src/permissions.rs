//! Who may do what.
//!
//! Every handler states the resource it touches and the method it serves;
//! [`check`] turns a refusal into 401 for anonymous callers and 403 otherwise.

use axum::http::Method;

use crate::{
    entities::{comment, review, user},
    error::{AppError, AppResult},
};

pub use crate::entities::user::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Safe methods on public resources.
    Read,
    /// Create content and change one's own.
    Write,
    /// Change anyone's reviews and comments.
    Moderate,
    /// Manage titles, categories, genres and users.
    Administer,
}

impl Capability {
    /// `None` is the anonymous caller.
    pub fn granted_to(self, role: Option<Role>) -> bool {
        match (self, role) {
            (Capability::Read, _) => true,
            (_, None) => false,
            (Capability::Write, Some(_)) => true,
            (Capability::Moderate, Some(role)) => matches!(role, Role::Moderator | Role::Admin),
            (Capability::Administer, Some(role)) => role == Role::Admin,
        }
    }
}

/// The user a request acts as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: i32,
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn has(&self, capability: Capability) -> bool {
        capability.granted_to(Some(self.role))
    }
}

impl From<&user::Model> for Actor {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: Role::effective(user.role, user.is_staff, user.is_superuser),
        }
    }
}

/// Content owned by the user who wrote it.
pub trait Authored {
    fn author_id(&self) -> i32;
}

impl Authored for review::Model {
    fn author_id(&self) -> i32 {
        self.author_id
    }
}

impl Authored for comment::Model {
    fn author_id(&self) -> i32 {
        self.author_id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    /// Titles, categories and genres.
    Catalog,
    /// User accounts other than one's own.
    Users,
    /// The review or comment collections of a parent.
    Contributions,
    /// A single review or comment.
    Owned { author_id: i32 },
}

pub fn is_safe(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::OPTIONS].contains(method)
}

pub fn permits(actor: Option<&Actor>, method: &Method, resource: Resource) -> bool {
    let role = actor.map(|a| a.role);
    match resource {
        Resource::Users => Capability::Administer.granted_to(role),
        _ if is_safe(method) => Capability::Read.granted_to(role),
        Resource::Catalog => Capability::Administer.granted_to(role),
        Resource::Contributions => Capability::Write.granted_to(role),
        Resource::Owned { author_id } => match actor {
            Some(actor) => actor.id == author_id || actor.has(Capability::Moderate),
            None => false,
        },
    }
}

pub fn check(actor: Option<&Actor>, method: &Method, resource: Resource) -> AppResult<()> {
    if permits(actor, method, resource) {
        return Ok(());
    }
    match actor {
        None => Err(AppError::Unauthorized),
        Some(actor) => {
            tracing::debug!(user = %actor.username, method = %method, resource = ?resource, "permission denied");
            Err(AppError::Forbidden)
        },
    }
}

/// Object-level check for mutating a review or comment.
pub fn check_owned<T: Authored>(actor: &Actor, method: &Method, object: &T) -> AppResult<()> {
    check(Some(actor), method, Resource::Owned { author_id: object.author_id() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: i32, role: Role) -> Actor {
        Actor { id, username: format!("user{id}"), role }
    }

    #[test]
    fn anonymous_is_read_only() {
        assert!(permits(None, &Method::GET, Resource::Catalog));
        assert!(permits(None, &Method::GET, Resource::Owned { author_id: 1 }));
        assert!(!permits(None, &Method::POST, Resource::Catalog));
        assert!(!permits(None, &Method::POST, Resource::Contributions));
        assert!(!permits(None, &Method::GET, Resource::Users));
    }

    #[test]
    fn authors_change_only_their_own_content() {
        let bob = actor(1, Role::User);
        assert!(permits(Some(&bob), &Method::PATCH, Resource::Owned { author_id: 1 }));
        assert!(permits(Some(&bob), &Method::DELETE, Resource::Owned { author_id: 1 }));
        assert!(!permits(Some(&bob), &Method::PATCH, Resource::Owned { author_id: 2 }));
        assert!(!permits(Some(&bob), &Method::DELETE, Resource::Owned { author_id: 2 }));
        assert!(permits(Some(&bob), &Method::POST, Resource::Contributions));
    }

    #[test]
    fn moderators_and_admins_change_any_content() {
        for role in [Role::Moderator, Role::Admin] {
            let staff = actor(9, role);
            assert!(permits(Some(&staff), &Method::PATCH, Resource::Owned { author_id: 1 }));
            assert!(permits(Some(&staff), &Method::DELETE, Resource::Owned { author_id: 1 }));
        }
    }

    #[test]
    fn only_admins_manage_catalog_and_users() {
        let moderator = actor(2, Role::Moderator);
        let admin = actor(3, Role::Admin);
        assert!(!permits(Some(&moderator), &Method::POST, Resource::Catalog));
        assert!(!permits(Some(&moderator), &Method::GET, Resource::Users));
        assert!(permits(Some(&admin), &Method::POST, Resource::Catalog));
        assert!(permits(Some(&admin), &Method::DELETE, Resource::Users));
    }

    #[test]
    fn refusals_map_to_401_or_403() {
        assert!(matches!(
            check(None, &Method::DELETE, Resource::Catalog),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            check(Some(&actor(1, Role::User)), &Method::DELETE, Resource::Catalog),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn staff_flag_makes_an_admin_actor() {
        let model = user::Model {
            id: 5,
            username: "root".to_string(),
            email: "root@example.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            bio: None,
            role: Role::User,
            is_staff: true,
            is_superuser: false,
            confirmation_code: String::new(),
            date_joined: 0,
        };
        assert_eq!(Actor::from(&model).role, Role::Admin);
    }
}
