use leafscan_shared::UserId;
use serde::{Deserialize, Serialize};

use crate::db::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(role: &str) -> Self {
        match role {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallerIdentity {
    #[default]
    Anonymous,
    User { id: UserId, role: Role },
}

impl CallerIdentity {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CallerIdentity::User { id, .. } => Some(*id),
            CallerIdentity::Anonymous => None,
        }
    }

    pub fn role_name(&self) -> &'static str {
        match self {
            CallerIdentity::User { role, .. } => role.as_str(),
            CallerIdentity::Anonymous => "",
        }
    }
}

impl From<&User> for CallerIdentity {
    fn from(user: &User) -> Self {
        CallerIdentity::User {
            id: user.id,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}
