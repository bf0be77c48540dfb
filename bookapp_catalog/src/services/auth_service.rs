use std::sync::Arc;

use validator::Validate;

use crate::api::{LoginRequest, LoginResponse};
use crate::auth::password::verify_password;
use crate::auth::{Claims, Identity, JwtService, TokenError};
use crate::error::ApiError;
use crate::repository::UsersRepository;

pub struct AuthService {
    users: Arc<dyn UsersRepository>,
    jwt: JwtService,
}

impl AuthService {
    pub fn new(users: Arc<dyn UsersRepository>, jwt: JwtService) -> Self {
        Self { users, jwt }
    }

    /// Checks the credentials and issues a signed token for the user.
    /// Unknown email and wrong password are reported the same way.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ApiError> {
        request.validate()?;

        let user = self
            .users
            .find_user_by_email(&request.email)
            .await?
            .ok_or(ApiError::InvalidCredentials)?;

        if !verify_password(request.password, user.password_hash.clone()).await? {
            tracing::info!("Failed login attempt for user {}", user.id);
            return Err(ApiError::InvalidCredentials);
        }

        let token = self
            .jwt
            .issue_token(&user)
            .map_err(|err| ApiError::Internal(format!("Failed to sign token: {}", err)))?;

        tracing::info!("User {} logged in", user.id);
        Ok(LoginResponse { token })
    }

    pub fn extract_claims(&self, token: &str) -> Result<Claims, TokenError> {
        self.jwt.extract_claims(token)
    }

    /// Identity of the token subject, None when the user is gone or the token belongs to someone else
    pub async fn resolve_identity(&self, claims: &Claims) -> Result<Option<Identity>, ApiError> {
        let user = self.users.find_user_by_email(&claims.sub).await?;

        Ok(user
            .filter(|user| user.id == claims.user_id)
            .map(|user| Identity {
                user_id: user.id,
                email: user.email,
            }))
    }
}
