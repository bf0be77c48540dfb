use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::api::{GenreId, UserId};
use crate::model::{Book, Genre, NewUser, Page, PageRequest, User};
use crate::repository::{BooksRepository, GenresRepository, RepositoryError, UsersRepository};
use crate::settings::IsbnScope;

type BookKey = (UserId, String);

/// Repository keeping users, genres and books in process memory.
/// Locks are always taken in the users -> genres -> books order
pub struct InMemoryRepository {
    users: parking_lot::RwLock<HashMap<UserId, User>>,
    genres: parking_lot::RwLock<HashMap<GenreId, Genre>>,
    books: parking_lot::RwLock<HashMap<BookKey, Book>>,
    user_sequence_generator: AtomicI32,
    genre_sequence_generator: AtomicI32,
    isbn_scope: IsbnScope,
}

impl InMemoryRepository {
    pub fn new(isbn_scope: IsbnScope) -> Self {
        Self {
            users: Default::default(),
            genres: Default::default(),
            books: Default::default(),
            user_sequence_generator: Default::default(),
            genre_sequence_generator: Default::default(),
            isbn_scope,
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new(IsbnScope::Global)
    }
}

fn paginate(mut books: Vec<Book>, page: PageRequest) -> Page<Book> {
    books.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.isbn.cmp(&b.isbn)));
    let total = books.len() as u64;
    let items = books
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.size as usize)
        .collect();
    Page { items, total }
}

#[async_trait::async_trait]
impl UsersRepository for InMemoryRepository {
    async fn add_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut users_lock = self.users.write();

        if users_lock.values().any(|stored| stored.email == user.email) {
            return Err(RepositoryError::Conflict(format!(
                "email {} already used",
                user.email
            )));
        }
        if users_lock.values().any(|stored| stored.username == user.username) {
            return Err(RepositoryError::Conflict(format!(
                "username {} already used",
                user.username
            )));
        }

        let id = self.user_sequence_generator.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
        };
        users_lock.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_user(&self, id: UserId) -> Result<User, RepositoryError> {
        self.users
            .read()
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::UserNotFound(id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepositoryError> {
        Ok(self.users.read().values().any(|user| user.email == email))
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .users
            .read()
            .values()
            .any(|user| user.username == username))
    }
}

#[async_trait::async_trait]
impl GenresRepository for InMemoryRepository {
    async fn add_genre(&self, name: &str, user_id: UserId) -> Result<Genre, RepositoryError> {
        let mut genres_lock = self.genres.write();

        let lowercase_name = name.to_lowercase();
        if genres_lock
            .values()
            .any(|genre| genre.user_id == user_id && genre.name.to_lowercase() == lowercase_name)
        {
            return Err(RepositoryError::Conflict(format!(
                "genre {} already exists for user {}",
                name, user_id
            )));
        }

        let id = self.genre_sequence_generator.fetch_add(1, Ordering::Relaxed) + 1;
        let genre = Genre {
            id,
            name: name.to_string(),
            user_id,
        };
        genres_lock.insert(id, genre.clone());
        Ok(genre)
    }

    async fn find_genre(
        &self,
        id: GenreId,
        user_id: UserId,
    ) -> Result<Option<Genre>, RepositoryError> {
        Ok(self
            .genres
            .read()
            .get(&id)
            .filter(|genre| genre.user_id == user_id)
            .cloned())
    }

    async fn exists_by_name(&self, name: &str, user_id: UserId) -> Result<bool, RepositoryError> {
        let lowercase_name = name.to_lowercase();
        Ok(self
            .genres
            .read()
            .values()
            .any(|genre| genre.user_id == user_id && genre.name.to_lowercase() == lowercase_name))
    }

    async fn list_genres(&self, user_id: UserId) -> Result<Vec<Genre>, RepositoryError> {
        let mut genres: Vec<Genre> = self
            .genres
            .read()
            .values()
            .filter(|genre| genre.user_id == user_id)
            .cloned()
            .collect();
        genres.sort_by_key(|genre| genre.id);
        Ok(genres)
    }

    async fn delete_genre(
        &self,
        id: GenreId,
        user_id: UserId,
    ) -> Result<Option<Vec<String>>, RepositoryError> {
        let mut genres_lock = self.genres.write();
        let mut books_lock = self.books.write();

        match genres_lock.entry(id) {
            Entry::Occupied(occupied) if occupied.get().user_id == user_id => {
                let removed_keys: Vec<BookKey> = books_lock
                    .iter()
                    .filter(|(_, book)| book.genre_id == id && book.user_id == user_id)
                    .map(|(key, _)| key.clone())
                    .collect();

                let removed_isbns = removed_keys
                    .into_iter()
                    .filter_map(|key| books_lock.remove(&key))
                    .map(|book| book.isbn)
                    .collect();

                occupied.remove();
                Ok(Some(removed_isbns))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl BooksRepository for InMemoryRepository {
    async fn add_book(&self, book: Book) -> Result<(), RepositoryError> {
        let mut books_lock = self.books.write();

        if self.isbn_scope == IsbnScope::Global
            && books_lock.values().any(|stored| stored.isbn == book.isbn)
        {
            return Err(RepositoryError::Conflict(format!(
                "book {} already exists",
                book.isbn
            )));
        }

        match books_lock.entry((book.user_id, book.isbn.clone())) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "book {} already exists",
                book.isbn
            ))),
            Entry::Vacant(entry) => {
                entry.insert(book);
                Ok(())
            }
        }
    }

    async fn update_book(&self, book: Book) -> Result<bool, RepositoryError> {
        let mut books_lock = self.books.write();

        if let Some(stored) = books_lock.get_mut(&(book.user_id, book.isbn.clone())) {
            // created_at is never overwritten
            *stored = Book {
                created_at: stored.created_at,
                ..book
            };
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn get_book(&self, isbn: &str, user_id: UserId) -> Result<Book, RepositoryError> {
        self.books
            .read()
            .get(&(user_id, isbn.to_string()))
            .cloned()
            .ok_or_else(|| RepositoryError::BookNotFound(isbn.to_string()))
    }

    async fn exists_by_isbn(&self, isbn: &str) -> Result<bool, RepositoryError> {
        Ok(self.books.read().values().any(|book| book.isbn == isbn))
    }

    async fn exists_by_isbn_and_user(
        &self,
        isbn: &str,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .books
            .read()
            .contains_key(&(user_id, isbn.to_string())))
    }

    async fn delete_book(&self, isbn: &str, user_id: UserId) -> Result<bool, RepositoryError> {
        Ok(self
            .books
            .write()
            .remove(&(user_id, isbn.to_string()))
            .is_some())
    }

    async fn list_books(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Book>, RepositoryError> {
        let books = self
            .books
            .read()
            .values()
            .filter(|book| book.user_id == user_id)
            .cloned()
            .collect();
        Ok(paginate(books, page))
    }

    async fn list_books_by_genre(
        &self,
        genre_id: GenreId,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Book>, RepositoryError> {
        let books = self
            .books
            .read()
            .values()
            .filter(|book| book.user_id == user_id && book.genre_id == genre_id)
            .cloned()
            .collect();
        Ok(paginate(books, page))
    }
}
