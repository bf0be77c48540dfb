pub use auth_service::AuthService;
pub use book_service::{BookService, CoverImage};
pub use genre_service::GenreService;
pub use user_service::UserService;

use crate::api::UserId;
use crate::error::ApiError;
use crate::image_store::ImageStore;
use crate::model::User;
use crate::repository::{BooksRepository, RepositoryError, UsersRepository};
use crate::settings::IsbnScope;

mod auth_service;
mod book_service;
mod genre_service;
mod user_service;

/// Loads the user, unknown ids become `NotFound`
async fn existing_user(
    users: &dyn UsersRepository,
    user_id: UserId,
) -> Result<User, ApiError> {
    match users.get_user(user_id).await {
        Ok(user) => Ok(user),
        Err(RepositoryError::UserNotFound(_)) => {
            Err(ApiError::NotFound(format!("User {} not found", user_id)))
        }
        Err(err) => Err(err.into()),
    }
}

/// Drops the covers of a book that is no longer stored, failures are only logged.
/// Shared isbn directories stay while another book with the isbn exists
async fn remove_covers_of_removed_book(
    books: &dyn BooksRepository,
    image_store: &ImageStore,
    user_id: UserId,
    isbn: &str,
) -> Result<(), ApiError> {
    if image_store.isbn_scope() == IsbnScope::Global && books.exists_by_isbn(isbn).await? {
        return Ok(());
    }
    if let Err(err) = image_store.remove_cover_images(user_id, isbn).await {
        tracing::error!("Failed to remove covers of removed book {} {}", isbn, err);
    }
    Ok(())
}
