pub use in_memory_repository::InMemoryRepository;
pub use postgres_repository::{PostgresRepository, PostgresRepositoryConfig};

use crate::api::{GenreId, UserId};
use crate::model::{Book, Genre, NewUser, Page, PageRequest, User};

mod in_memory_repository;
mod postgres_repository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Book {0} not found")]
    BookNotFound(String),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait UsersRepository: Send + Sync {
    /// Adds user to repository, returns the stored user with its assigned id
    async fn add_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<User, RepositoryError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepositoryError>;

    async fn exists_by_username(&self, username: &str) -> Result<bool, RepositoryError>;
}

#[async_trait::async_trait]
pub trait GenresRepository: Send + Sync {
    async fn add_genre(&self, name: &str, user_id: UserId) -> Result<Genre, RepositoryError>;

    /// Finds genre only if it is owned by the given user
    async fn find_genre(
        &self,
        id: GenreId,
        user_id: UserId,
    ) -> Result<Option<Genre>, RepositoryError>;

    /// Case insensitive check of the genre name within genres of one user
    async fn exists_by_name(&self, name: &str, user_id: UserId) -> Result<bool, RepositoryError>;

    /// Lists all genres of the user ordered by id
    async fn list_genres(&self, user_id: UserId) -> Result<Vec<Genre>, RepositoryError>;

    /// Deletes the books of the genre and then the genre itself.
    /// Returns None when the user has no such genre, otherwise isbns of the removed books
    async fn delete_genre(
        &self,
        id: GenreId,
        user_id: UserId,
    ) -> Result<Option<Vec<String>>, RepositoryError>;
}

#[async_trait::async_trait]
pub trait BooksRepository: Send + Sync {
    /// Fails with Conflict when the isbn is already stored in the configured scope,
    /// for the user or for anyone with a global isbn scope
    async fn add_book(&self, book: Book) -> Result<(), RepositoryError>;

    /// Replaces stored book identified by (isbn, user_id), returns false if it was not found
    async fn update_book(&self, book: Book) -> Result<bool, RepositoryError>;

    async fn get_book(&self, isbn: &str, user_id: UserId) -> Result<Book, RepositoryError>;

    /// Checks for the isbn among books of all users
    async fn exists_by_isbn(&self, isbn: &str) -> Result<bool, RepositoryError>;

    async fn exists_by_isbn_and_user(
        &self,
        isbn: &str,
        user_id: UserId,
    ) -> Result<bool, RepositoryError>;

    /// Returns true if book was deleted and false if it was not found
    async fn delete_book(&self, isbn: &str, user_id: UserId) -> Result<bool, RepositoryError>;

    /// Books of the user ordered by title
    async fn list_books(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Book>, RepositoryError>;

    /// Books of the user in one genre ordered by title
    async fn list_books_by_genre(
        &self,
        genre_id: GenreId,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Book>, RepositoryError>;
}
