use std::sync::Arc;

use validator::Validate;

use crate::api::{UserRegisterRequest, UserView};
use crate::auth::password::hash_password;
use crate::error::ApiError;
use crate::model::{NewUser, User};
use crate::repository::{RepositoryError, UsersRepository};

pub struct UserService {
    users: Arc<dyn UsersRepository>,
    bcrypt_cost: u32,
}

fn to_view(user: User) -> UserView {
    UserView {
        id: user.id,
        username: user.username,
        email: user.email,
    }
}

impl UserService {
    pub fn new(users: Arc<dyn UsersRepository>, bcrypt_cost: u32) -> Self {
        Self { users, bcrypt_cost }
    }

    pub async fn register(&self, request: UserRegisterRequest) -> Result<UserView, ApiError> {
        request.validate()?;

        if self.users.exists_by_email(&request.email).await? {
            return Err(ApiError::AlreadyExists("Email already exists".to_string()));
        }
        if self.users.exists_by_username(&request.username).await? {
            return Err(ApiError::AlreadyExists("Username already exists".to_string()));
        }

        let password_hash = hash_password(request.password, self.bcrypt_cost).await?;
        let user = self
            .users
            .add_user(NewUser {
                username: request.username,
                email: request.email,
                password_hash,
            })
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => {
                    ApiError::AlreadyExists("Email or username already exists".to_string())
                }
                other => other.into(),
            })?;

        tracing::info!("Registered user {}", user.id);
        Ok(to_view(user))
    }
}
