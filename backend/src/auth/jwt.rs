use super::models::Claims;
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use leafscan_shared::UserId;

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT decoding error: {0}")]
    Decoding(String),
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
}

#[derive(Clone)]
pub struct JwtService {
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        if token.is_empty() {
            return Err(JwtError::InvalidToken);
        }

        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(JwtError::InvalidToken);
        }

        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(token_data) => {
                let now = Utc::now().timestamp() as usize;
                log::debug!(
                    "JWT token decoded successfully. User: {}, Role: {}, Iat: {}, Exp: {}, Now: {}",
                    token_data.claims.sub,
                    token_data.claims.role,
                    token_data.claims.iat,
                    token_data.claims.exp,
                    now
                );

                if token_data.claims.exp < now {
                    log::warn!(
                        "JWT token expired. Exp: {}, Now: {}",
                        token_data.claims.exp,
                        now
                    );
                    return Err(JwtError::TokenExpired);
                }
                Ok(token_data.claims)
            }
            Err(err) => {
                log::debug!("JWT token decode error: {:?}", err);
                match err.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        Err(JwtError::TokenExpired)
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken => Err(JwtError::InvalidToken),
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        Err(JwtError::InvalidToken)
                    }
                    _ => Err(JwtError::Decoding(err.to_string())),
                }
            }
        }
    }

    pub fn verify_user(&self, token: &str) -> Result<UserId, JwtError> {
        let claims = self.verify_token(token)?;
        claims
            .sub
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| JwtError::Decoding(format!("subject {:?} is not a user id", claims.sub)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use crate::testing::issue_token;
    use chrono::Duration;

    #[test]
    fn issued_token_verifies_to_user() {
        let jwt = JwtService::new("secret");
        let token = issue_token("secret", UserId(42), Role::User, Duration::hours(1));
        assert_eq!(jwt.verify_user(&token).unwrap(), UserId(42));
        assert_eq!(jwt.verify_token(&token).unwrap().role, "user");
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = issue_token("one", UserId(1), Role::Admin, Duration::hours(1));
        let err = JwtService::new("two").verify_token(&token).unwrap_err();
        assert!(matches!(err, JwtError::InvalidToken));
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = JwtService::new("secret");
        let token = issue_token("secret", UserId(1), Role::User, Duration::hours(-2));
        assert!(matches!(jwt.verify_token(&token), Err(JwtError::TokenExpired)));
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        let jwt = JwtService::new("secret");
        let claims = Claims {
            sub: "not-a-number".to_string(),
            role: "user".to_string(),
            exp: (Utc::now().timestamp() + 3600) as usize,
            iat: Utc::now().timestamp() as usize,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(jwt.verify_user(&token), Err(JwtError::Decoding(_))));
    }

    #[test]
    fn malformed_tokens_are_invalid() {
        let jwt = JwtService::new("secret");
        assert!(matches!(jwt.verify_token(""), Err(JwtError::InvalidToken)));
        assert!(matches!(jwt.verify_token("a.b"), Err(JwtError::InvalidToken)));
    }
}
