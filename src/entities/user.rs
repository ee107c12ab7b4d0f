use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub role: Role,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Empty once it has been exchanged for a token.
    pub confirmation_code: String,
    pub date_joined: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "moderator")]
    Moderator,
    #[sea_orm(string_value = "admin")]
    Admin,
}

impl Role {
    /// Role stored for an account. Staff and superusers are always admins,
    /// whatever role was assigned to them.
    pub fn effective(assigned: Role, is_staff: bool, is_superuser: bool) -> Role {
        if is_superuser || is_staff { Role::Admin } else { assigned }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::review::Entity")]
    Review,
    #[sea_orm(has_many = "super::comment::Entity")]
    Comment,
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Review.def()
    }
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_and_superusers_are_admins() {
        assert_eq!(Role::effective(Role::User, true, false), Role::Admin);
        assert_eq!(Role::effective(Role::Moderator, false, true), Role::Admin);
    }

    #[test]
    fn regular_accounts_keep_assigned_role() {
        assert_eq!(Role::effective(Role::User, false, false), Role::User);
        assert_eq!(Role::effective(Role::Moderator, false, false), Role::Moderator);
        assert_eq!(Role::effective(Role::Admin, false, false), Role::Admin);
    }
}
