use std::sync::Arc;

use validator::Validate;

use crate::api::{GenreId, GenreRegisterRequest, GenreView, UserId};
use crate::error::ApiError;
use crate::image_store::ImageStore;
use crate::model::Genre;
use crate::repository::{BooksRepository, GenresRepository, RepositoryError, UsersRepository};
use crate::services::{existing_user, remove_covers_of_removed_book};

pub struct GenreService {
    genres: Arc<dyn GenresRepository>,
    users: Arc<dyn UsersRepository>,
    books: Arc<dyn BooksRepository>,
    image_store: ImageStore,
}

fn to_view(genre: Genre) -> GenreView {
    GenreView {
        id: genre.id,
        name: genre.name,
    }
}

impl GenreService {
    pub fn new(
        genres: Arc<dyn GenresRepository>,
        users: Arc<dyn UsersRepository>,
        books: Arc<dyn BooksRepository>,
        image_store: ImageStore,
    ) -> Self {
        Self {
            genres,
            users,
            books,
            image_store,
        }
    }

    pub async fn register(&self, request: GenreRegisterRequest) -> Result<GenreView, ApiError> {
        request.validate()?;
        existing_user(self.users.as_ref(), request.user_id).await?;

        if self
            .genres
            .exists_by_name(&request.name, request.user_id)
            .await?
        {
            return Err(ApiError::AlreadyExists(
                "A genre with that name already exists for this user".to_string(),
            ));
        }

        let genre = self
            .genres
            .add_genre(&request.name, request.user_id)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => ApiError::AlreadyExists(
                    "A genre with that name already exists for this user".to_string(),
                ),
                other => other.into(),
            })?;

        tracing::info!("User {} registered genre {}", genre.user_id, genre.id);
        Ok(to_view(genre))
    }

    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<GenreView>, ApiError> {
        Ok(self
            .genres
            .list_genres(user_id)
            .await?
            .into_iter()
            .map(to_view)
            .collect())
    }

    /// Removes the genre together with its books and their covers
    pub async fn delete(&self, genre_id: GenreId, user_id: UserId) -> Result<(), ApiError> {
        let removed_isbns = self
            .genres
            .delete_genre(genre_id, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Genre {} not found", genre_id)))?;

        tracing::info!(
            "User {} deleted genre {} with {} books",
            user_id,
            genre_id,
            removed_isbns.len()
        );

        for isbn in removed_isbns {
            remove_covers_of_removed_book(self.books.as_ref(), &self.image_store, user_id, &isbn)
                .await?;
        }
        Ok(())
    }
}
