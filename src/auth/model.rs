use serde::{Deserialize, Serialize};

use crate::user;

/// Verified identity attached to a connection or request for its lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: user::Id,
    pub name: String,
    pub role: user::Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub name: String,
    pub role: user::Role,
    pub exp: usize,
}

impl From<TokenClaims> for UserInfo {
    fn from(claims: TokenClaims) -> Self {
        Self {
            id: user::Id(claims.sub),
            name: claims.name,
            role: claims.role,
        }
    }
}
