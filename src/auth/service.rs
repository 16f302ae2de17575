use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::warn;

use super::model::{TokenClaims, UserInfo};

#[async_trait]
pub trait AuthService {
    async fn validate(&self, token: &str) -> super::Result<UserInfo>;
}

pub struct JwtAuthService {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    async fn validate(&self, token: &str) -> super::Result<UserInfo> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| UserInfo::from(data.claims))
            .map_err(|e| {
                warn!("Failed to decode access token: {e:?}");
                super::Error::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, EncodingKey, Header};

    use crate::user;

    use super::*;

    const SECRET: &str = "test-secret";

    fn token(exp_offset: i64) -> String {
        let claims = TokenClaims {
            sub: "u1".into(),
            name: "Alice".into(),
            role: user::Role::Buyer,
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("token should encode")
    }

    #[tokio::test]
    async fn validates_a_well_formed_token() {
        let service = JwtAuthService::new(SECRET);

        let user_info = service.validate(&token(3600)).await.expect("valid token");

        assert_eq!(user_info.id, user::Id::from("u1"));
        assert_eq!(user_info.name, "Alice");
        assert_eq!(user_info.role, user::Role::Buyer);
    }

    #[tokio::test]
    async fn rejects_an_expired_token() {
        let service = JwtAuthService::new(SECRET);

        let result = service.validate(&token(-3600)).await;

        assert!(matches!(result, Err(crate::auth::Error::InvalidToken)));
    }

    #[tokio::test]
    async fn rejects_a_token_signed_with_another_secret() {
        let service = JwtAuthService::new("other-secret");

        let result = service.validate(&token(3600)).await;

        assert!(matches!(result, Err(crate::auth::Error::InvalidToken)));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let service = JwtAuthService::new(SECRET);

        let result = service.validate("not-a-jwt").await;

        assert!(matches!(result, Err(crate::auth::Error::InvalidToken)));
    }
}
