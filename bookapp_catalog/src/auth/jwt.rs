use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::UserId;
use crate::model::User;
use crate::settings::AuthSettings;

/// Claims carried by issued tokens, the subject is the user email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token or unknown error")]
    Other,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Malformed,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Other,
        }
    }
}

/// Issues and verifies HS256 tokens signed with the configured secret
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl_seconds: i64,
}

impl JwtService {
    pub fn new(settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            validation,
            token_ttl_seconds: settings.token_ttl_seconds,
        }
    }

    pub fn issue_token(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        self.encode_claims(&Claims {
            sub: user.email.clone(),
            user_id: user.id,
            username: user.username.clone(),
            iat: now,
            exp: now + self.token_ttl_seconds,
        })
    }

    pub fn extract_claims(&self, token: &str) -> Result<Claims, TokenError> {
        Ok(decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims)
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
    }
}

#[cfg(test)]
mod jwt_tests {
    use super::*;
    use crate::settings::Settings;

    fn expired_token(service: &JwtService, user: &User) -> String {
        let now = Utc::now().timestamp();
        service
            .encode_claims(&Claims {
                sub: user.email.clone(),
                user_id: user.id,
                username: user.username.clone(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap()
    }

    fn user() -> User {
        User {
            id: 7,
            username: "anna".to_string(),
            email: "anna@example.com".to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[test]
    fn test_issued_token_round_trip() {
        let service = JwtService::new(&Settings::default().auth);
        let token = service.issue_token(&user()).unwrap();

        let claims = service.extract_claims(&token).unwrap();
        assert_eq!(claims.sub, "anna@example.com");
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "anna");
        assert_eq!(claims.exp - claims.iat, 86400);
    }

    #[test]
    fn test_token_errors() {
        let service = JwtService::new(&Settings::default().auth);

        assert_eq!(
            service.extract_claims(&expired_token(&service, &user())),
            Err(TokenError::Expired)
        );
        assert_eq!(
            service.extract_claims("not-a-token"),
            Err(TokenError::Malformed)
        );

        let mut other_settings = Settings::default().auth;
        other_settings.jwt_secret = "another-secret".to_string();
        let foreign_token = JwtService::new(&other_settings)
            .issue_token(&user())
            .unwrap();
        assert_eq!(
            service.extract_claims(&foreign_token),
            Err(TokenError::InvalidSignature)
        );
    }
}
