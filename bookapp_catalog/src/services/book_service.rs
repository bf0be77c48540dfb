use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, SubsecRound, Utc};
use validator::Validate;

use crate::api::{
    BookPage, BookRegisterRequest, BookUpdateRequest, BookView, GenreId, PageQuery, UserId,
};
use crate::error::ApiError;
use crate::image_store::{ImageStore, ImageStoreError};
use crate::model::{Book, Genre, Page, PageRequest};
use crate::repository::{BooksRepository, GenresRepository, RepositoryError, UsersRepository};
use crate::services::{existing_user, remove_covers_of_removed_book};
use crate::settings::{CatalogSettings, IsbnScope};

/// Cover file read back from the image store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
}

pub struct BookService {
    books: Arc<dyn BooksRepository>,
    genres: Arc<dyn GenresRepository>,
    users: Arc<dyn UsersRepository>,
    image_store: ImageStore,
    catalog: CatalogSettings,
}

fn to_view(book: Book, genre_name: String) -> BookView {
    BookView {
        isbn: book.isbn,
        title: book.title,
        genre_id: book.genre_id,
        genre: genre_name,
        published_date: book.published_date,
        synopsis: book.synopsis,
        created_at: book.created_at,
        user_id: book.user_id,
        cover_image_path: book.cover_image_path,
    }
}

fn to_page(
    page: Page<Book>,
    request: PageRequest,
    genre_names: &HashMap<GenreId, String>,
) -> BookPage {
    let total_pages = page.total.div_ceil(request.size as u64);
    let content: Vec<BookView> = page
        .items
        .into_iter()
        .map(|book| {
            let genre_name = genre_names.get(&book.genre_id).cloned().unwrap_or_default();
            to_view(book, genre_name)
        })
        .collect();

    BookPage {
        total_elements: page.total,
        total_pages,
        size: request.size,
        number: request.page,
        number_of_elements: content.len() as u32,
        first: request.page == 0,
        last: request.page as u64 + 1 >= total_pages,
        empty: content.is_empty(),
        content,
    }
}

fn ensure_not_in_future(published_date: NaiveDate) -> Result<(), ApiError> {
    if published_date > Utc::now().date_naive() {
        return Err(ApiError::invalid_field(
            "publishedDate",
            "Published date cannot be in the future",
        ));
    }
    Ok(())
}

fn book_not_found(isbn: &str) -> ApiError {
    ApiError::NotFound(format!("Book {} not found for user", isbn))
}

fn invalid_cover_path() -> ApiError {
    ApiError::BadRequest("Invalid cover image path".to_string())
}

/// Splits a relative cover path into segments, dropping empty and `.` segments.
/// Absolute paths, backslashes and `..` are refused.
fn normalize_cover_path(path: &str) -> Result<Vec<&str>, ApiError> {
    if path.starts_with('/') || path.contains('\\') {
        return Err(invalid_cover_path());
    }
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.contains(&"..") || segments.len() < 2 {
        return Err(invalid_cover_path());
    }
    Ok(segments)
}

fn content_type_of(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

impl BookService {
    pub fn new(
        books: Arc<dyn BooksRepository>,
        genres: Arc<dyn GenresRepository>,
        users: Arc<dyn UsersRepository>,
        image_store: ImageStore,
        catalog: CatalogSettings,
    ) -> Self {
        Self {
            books,
            genres,
            users,
            image_store,
            catalog,
        }
    }

    fn page_request(&self, query: &PageQuery) -> Result<PageRequest, ApiError> {
        let size = query.size.unwrap_or(self.catalog.default_page_size);
        if size == 0 || size > self.catalog.max_page_size {
            return Err(ApiError::BadRequest(format!(
                "Page size must be between 1 and {}",
                self.catalog.max_page_size
            )));
        }
        Ok(PageRequest {
            page: query.page.unwrap_or(0),
            size,
        })
    }

    async fn owned_genre(&self, genre_id: GenreId, user_id: UserId) -> Result<Genre, ApiError> {
        self.genres
            .find_genre(genre_id, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Genre {} not found", genre_id)))
    }

    async fn owned_book(&self, isbn: &str, user_id: UserId) -> Result<Book, ApiError> {
        match self.books.get_book(isbn, user_id).await {
            Ok(book) => Ok(book),
            Err(RepositoryError::BookNotFound(_)) => Err(book_not_found(isbn)),
            Err(err) => Err(err.into()),
        }
    }

    async fn view_of(&self, book: Book) -> Result<BookView, ApiError> {
        let genre = self.owned_genre(book.genre_id, book.user_id).await?;
        Ok(to_view(book, genre.name))
    }

    async fn genre_names(&self, user_id: UserId) -> Result<HashMap<GenreId, String>, ApiError> {
        Ok(self
            .genres
            .list_genres(user_id)
            .await?
            .into_iter()
            .map(|genre| (genre.id, genre.name))
            .collect())
    }

    async fn isbn_taken(&self, isbn: &str, user_id: UserId) -> Result<bool, ApiError> {
        Ok(match self.catalog.isbn_scope {
            IsbnScope::Global => self.books.exists_by_isbn(isbn).await?,
            IsbnScope::PerUser => self.books.exists_by_isbn_and_user(isbn, user_id).await?,
        })
    }

    pub async fn register(&self, request: BookRegisterRequest) -> Result<BookView, ApiError> {
        request.validate()?;
        ensure_not_in_future(request.published_date)?;

        if self.isbn_taken(&request.isbn, request.user_id).await? {
            return Err(ApiError::AlreadyExists(format!(
                "A book with ISBN {} already exists",
                request.isbn
            )));
        }

        existing_user(self.users.as_ref(), request.user_id).await?;
        let genre = self.owned_genre(request.genre_id, request.user_id).await?;

        let book = Book {
            isbn: request.isbn,
            title: request.title,
            genre_id: genre.id,
            published_date: request.published_date,
            synopsis: request.synopsis,
            created_at: Utc::now().naive_utc().trunc_subsecs(6),
            user_id: request.user_id,
            cover_image_path: None,
        };

        self.books
            .add_book(book.clone())
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => ApiError::AlreadyExists(format!(
                    "A book with ISBN {} already exists",
                    book.isbn
                )),
                other => other.into(),
            })?;

        tracing::info!("User {} registered book {}", book.user_id, book.isbn);
        Ok(to_view(book, genre.name))
    }

    /// Only fields present in the request are changed
    pub async fn update(&self, request: BookUpdateRequest) -> Result<BookView, ApiError> {
        request.validate()?;
        let mut book = self.owned_book(&request.isbn, request.user_id).await?;

        if let Some(published_date) = request.published_date {
            ensure_not_in_future(published_date)?;
            book.published_date = published_date;
        }
        if let Some(genre_id) = request.genre_id {
            book.genre_id = self.owned_genre(genre_id, request.user_id).await?.id;
        }
        if let Some(title) = request.title {
            book.title = title;
        }
        if let Some(synopsis) = request.synopsis {
            book.synopsis = synopsis;
        }

        if !self.books.update_book(book.clone()).await? {
            return Err(book_not_found(&book.isbn));
        }

        tracing::info!("User {} updated book {}", book.user_id, book.isbn);
        self.view_of(book).await
    }

    pub async fn delete(&self, isbn: &str, user_id: UserId) -> Result<(), ApiError> {
        existing_user(self.users.as_ref(), user_id).await?;

        if !self.books.delete_book(isbn, user_id).await? {
            return Err(book_not_found(isbn));
        }
        tracing::info!("User {} deleted book {}", user_id, isbn);

        remove_covers_of_removed_book(self.books.as_ref(), &self.image_store, user_id, isbn).await
    }

    /// Books of the user ordered by title
    pub async fn find_paginated(
        &self,
        user_id: UserId,
        query: PageQuery,
    ) -> Result<BookPage, ApiError> {
        let request = self.page_request(&query)?;
        existing_user(self.users.as_ref(), user_id).await?;

        let page = self.books.list_books(user_id, request).await?;
        Ok(to_page(page, request, &self.genre_names(user_id).await?))
    }

    pub async fn find_by_genre_and_user(
        &self,
        genre_id: GenreId,
        user_id: UserId,
        query: PageQuery,
    ) -> Result<BookPage, ApiError> {
        let request = self.page_request(&query)?;
        existing_user(self.users.as_ref(), user_id).await?;
        let genre = self.owned_genre(genre_id, user_id).await?;

        let page = self
            .books
            .list_books_by_genre(genre.id, user_id, request)
            .await?;
        Ok(to_page(
            page,
            request,
            &HashMap::from([(genre.id, genre.name)]),
        ))
    }

    pub async fn find_by_isbn_and_user(
        &self,
        isbn: &str,
        user_id: UserId,
    ) -> Result<BookView, ApiError> {
        existing_user(self.users.as_ref(), user_id).await?;
        let book = self.owned_book(isbn, user_id).await?;
        self.view_of(book).await
    }

    pub async fn update_cover_image(
        &self,
        isbn: &str,
        user_id: UserId,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BookView, ApiError> {
        let mut book = self.owned_book(isbn, user_id).await?;
        self.image_store.validate_image(&bytes, content_type)?;

        let cover_path = self
            .image_store
            .store_cover_image(bytes, content_type, user_id, isbn)
            .await?;
        book.cover_image_path = Some(cover_path);

        if !self.books.update_book(book.clone()).await? {
            // Deleted while the cover was written
            remove_covers_of_removed_book(self.books.as_ref(), &self.image_store, user_id, isbn)
                .await?;
            return Err(book_not_found(isbn));
        }

        tracing::info!("User {} updated cover of book {}", user_id, isbn);
        self.view_of(book).await
    }

    /// Reads a cover, the path has to point into the cover directory of a book owned by the user
    pub async fn get_cover_image(
        &self,
        user_id: UserId,
        path: &str,
    ) -> Result<CoverImage, ApiError> {
        let segments = normalize_cover_path(path)?;
        let owner = self
            .image_store
            .cover_owner(&segments)
            .ok_or_else(invalid_cover_path)?;

        existing_user(self.users.as_ref(), user_id).await?;
        let foreign_directory = owner.user_id.is_some_and(|owner_id| owner_id != user_id);
        if foreign_directory || !self.books.exists_by_isbn_and_user(owner.isbn, user_id).await? {
            return Err(ApiError::Forbidden(
                "Not allowed to view this image".to_string(),
            ));
        }

        let relative_path = segments.join("/");
        let bytes = match self.image_store.load_cover_image(&relative_path).await {
            Ok(bytes) => bytes,
            Err(ImageStoreError::NotFound(_)) => {
                return Err(ApiError::NotFound("Image not found".to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let file_name = segments[segments.len() - 1].to_string();
        Ok(CoverImage {
            bytes,
            content_type: content_type_of(&file_name),
            file_name,
        })
    }
}
