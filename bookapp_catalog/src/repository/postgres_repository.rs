use anyhow::Context;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{GenreId, UserId};
use crate::model::{Book, Genre, NewUser, Page, PageRequest, User};
use crate::repository::{BooksRepository, GenresRepository, RepositoryError, UsersRepository};
use crate::settings::IsbnScope;

const BOOK_COLUMNS: &str =
    "isbn, title, genre_id, published_date, synopsis, created_at, user_id, cover_image_path";

pub struct PostgresRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub isbn_scope: IsbnScope,
}

pub struct PostgresRepository {
    client: Client,
}

impl PostgresRepository {
    pub async fn init(config: PostgresRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!(
            "Postgres connection: postgresql://{}@{}",
            config.username,
            config.hostname
        );
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS users (
            id              SERIAL PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL
            )
        ",
            )
            .await
            .context("Failed to setup users table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS genres (
            id              SERIAL PRIMARY KEY,
            name            TEXT NOT NULL,
            user_id         INTEGER NOT NULL REFERENCES users (id)
            );
        CREATE UNIQUE INDEX IF NOT EXISTS genres_name_user_id_idx ON genres (LOWER(name), user_id);
        ",
            )
            .await
            .context("Failed to setup genres table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS books (
            isbn                TEXT NOT NULL,
            title               TEXT NOT NULL,
            genre_id            INTEGER NOT NULL REFERENCES genres (id),
            published_date      DATE NOT NULL,
            synopsis            TEXT NOT NULL,
            created_at          TIMESTAMP NOT NULL,
            user_id             INTEGER NOT NULL REFERENCES users (id),
            cover_image_path    TEXT,
            PRIMARY KEY (isbn, user_id)
            )
        ",
            )
            .await
            .context("Failed to setup books table")?;

        let isbn_index = match config.isbn_scope {
            IsbnScope::Global => {
                "CREATE UNIQUE INDEX IF NOT EXISTS books_isbn_global_idx ON books (isbn)"
            }
            IsbnScope::PerUser => "DROP INDEX IF EXISTS books_isbn_global_idx",
        };
        client
            .batch_execute(isbn_index)
            .await
            .context("Failed to setup books isbn index")?;

        Ok(Self { client })
    }

    async fn query_page(
        &self,
        count_query: &str,
        select_query: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
        page: PageRequest,
    ) -> Result<Page<Book>, RepositoryError> {
        let count_stmt: Statement = self.client.prepare(count_query).await?;
        let total: i64 = self.client.query_one(&count_stmt, params).await?.try_get(0)?;

        let limit = page.size as i64;
        let offset = page.offset() as i64;
        let mut page_params = params.to_vec();
        page_params.push(&limit);
        page_params.push(&offset);

        let select_stmt: Statement = self.client.prepare(select_query).await?;
        let rows = self.client.query(&select_stmt, &page_params).await?;

        Ok(Page {
            items: rows.iter().map(book_from_row).collect::<Result<_, _>>()?,
            total: total as u64,
        })
    }
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.as_db_error()
        .map(|db_err| db_err.code() == &SqlState::UNIQUE_VIOLATION)
        .unwrap_or_default()
}

fn user_from_row(row: &Row) -> Result<User, RepositoryError> {
    Ok(User {
        id: row.try_get(0)?,
        username: row.try_get(1)?,
        email: row.try_get(2)?,
        password_hash: row.try_get(3)?,
    })
}

fn genre_from_row(row: &Row) -> Result<Genre, RepositoryError> {
    Ok(Genre {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        user_id: row.try_get(2)?,
    })
}

fn book_from_row(row: &Row) -> Result<Book, RepositoryError> {
    Ok(Book {
        isbn: row.try_get(0)?,
        title: row.try_get(1)?,
        genre_id: row.try_get(2)?,
        published_date: row.try_get(3)?,
        synopsis: row.try_get(4)?,
        created_at: row.try_get(5)?,
        user_id: row.try_get(6)?,
        cover_image_path: row.try_get(7)?,
    })
}

#[async_trait::async_trait]
impl UsersRepository for PostgresRepository {
    async fn add_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO users (username, email, password) VALUES ($1, $2, $3) \
                 RETURNING id, username, email, password",
            )
            .await?;

        let rows = self
            .client
            .query(&stmt, &[&user.username, &user.email, &user.password_hash])
            .await;

        match rows {
            Ok(rows) => user_from_row(
                rows.first()
                    .ok_or_else(|| RepositoryError::Other("Id not returned".to_string()))?,
            ),
            Err(err) if is_unique_violation(&err) => Err(RepositoryError::Conflict(format!(
                "user {} / {} already exists",
                user.username, user.email
            ))),
            Err(other_err) => Err(other_err.into()),
        }
    }

    async fn get_user(&self, id: UserId) -> Result<User, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, username, email, password FROM users WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&id]).await?;

        user_from_row(rows.first().ok_or(RepositoryError::UserNotFound(id))?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, username, email, password FROM users WHERE email = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&email]).await?;
        rows.first().map(user_from_row).transpose()
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .await?;
        Ok(self.client.query_one(&stmt, &[&email]).await?.try_get(0)?)
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .await?;
        Ok(self.client.query_one(&stmt, &[&username]).await?.try_get(0)?)
    }
}

#[async_trait::async_trait]
impl GenresRepository for PostgresRepository {
    async fn add_genre(&self, name: &str, user_id: UserId) -> Result<Genre, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO genres (name, user_id) VALUES ($1, $2) RETURNING id, name, user_id")
            .await?;

        match self.client.query(&stmt, &[&name, &user_id]).await {
            Ok(rows) => genre_from_row(
                rows.first()
                    .ok_or_else(|| RepositoryError::Other("Id not returned".to_string()))?,
            ),
            Err(err) if is_unique_violation(&err) => Err(RepositoryError::Conflict(format!(
                "genre {} already exists for user {}",
                name, user_id
            ))),
            Err(other_err) => Err(other_err.into()),
        }
    }

    async fn find_genre(
        &self,
        id: GenreId,
        user_id: UserId,
    ) -> Result<Option<Genre>, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, name, user_id FROM genres WHERE id = $1 AND user_id = $2")
            .await?;

        let rows = self.client.query(&stmt, &[&id, &user_id]).await?;
        rows.first().map(genre_from_row).transpose()
    }

    async fn exists_by_name(&self, name: &str, user_id: UserId) -> Result<bool, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "SELECT EXISTS (SELECT 1 FROM genres WHERE LOWER(name) = LOWER($1) AND user_id = $2)",
            )
            .await?;
        Ok(self
            .client
            .query_one(&stmt, &[&name, &user_id])
            .await?
            .try_get(0)?)
    }

    async fn list_genres(&self, user_id: UserId) -> Result<Vec<Genre>, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, name, user_id FROM genres WHERE user_id = $1 ORDER BY id")
            .await?;

        let rows = self.client.query(&stmt, &[&user_id]).await?;
        rows.iter().map(genre_from_row).collect()
    }

    async fn delete_genre(
        &self,
        id: GenreId,
        user_id: UserId,
    ) -> Result<Option<Vec<String>>, RepositoryError> {
        // Single statement, so books and genre are removed atomically
        let stmt: Statement = self
            .client
            .prepare(
                "
        WITH owned_genre AS (
            SELECT id FROM genres WHERE id = $1 AND user_id = $2
        ), removed_books AS (
            DELETE FROM books
            WHERE user_id = $2 AND genre_id IN (SELECT id FROM owned_genre)
            RETURNING isbn
        ), removed_genre AS (
            DELETE FROM genres WHERE id IN (SELECT id FROM owned_genre)
            RETURNING id
        )
        SELECT EXISTS (SELECT 1 FROM removed_genre), ARRAY(SELECT isbn FROM removed_books)
        ",
            )
            .await?;

        let row = self.client.query_one(&stmt, &[&id, &user_id]).await?;
        let genre_removed: bool = row.try_get(0)?;
        let removed_isbns: Vec<String> = row.try_get(1)?;

        Ok(genre_removed.then_some(removed_isbns))
    }
}

#[async_trait::async_trait]
impl BooksRepository for PostgresRepository {
    async fn add_book(&self, book: Book) -> Result<(), RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!(
                "INSERT INTO books ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                BOOK_COLUMNS
            ))
            .await?;

        let result = self
            .client
            .execute(
                &stmt,
                &[
                    &book.isbn,
                    &book.title,
                    &book.genre_id,
                    &book.published_date,
                    &book.synopsis,
                    &book.created_at,
                    &book.user_id,
                    &book.cover_image_path,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepositoryError::Conflict(format!(
                "book {} already exists",
                book.isbn
            ))),
            Err(other_err) => Err(other_err.into()),
        }
    }

    async fn update_book(&self, book: Book) -> Result<bool, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE books SET title = $3, genre_id = $4, published_date = $5, synopsis = $6, \
                 cover_image_path = $7 WHERE isbn = $1 AND user_id = $2 RETURNING isbn",
            )
            .await?;

        let rows = self
            .client
            .query(
                &stmt,
                &[
                    &book.isbn,
                    &book.user_id,
                    &book.title,
                    &book.genre_id,
                    &book.published_date,
                    &book.synopsis,
                    &book.cover_image_path,
                ],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn get_book(&self, isbn: &str, user_id: UserId) -> Result<Book, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!(
                "SELECT {} FROM books WHERE isbn = $1 AND user_id = $2",
                BOOK_COLUMNS
            ))
            .await?;

        let rows = self.client.query(&stmt, &[&isbn, &user_id]).await?;

        book_from_row(
            rows.first()
                .ok_or_else(|| RepositoryError::BookNotFound(isbn.to_string()))?,
        )
    }

    async fn exists_by_isbn(&self, isbn: &str) -> Result<bool, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT EXISTS (SELECT 1 FROM books WHERE isbn = $1)")
            .await?;
        Ok(self.client.query_one(&stmt, &[&isbn]).await?.try_get(0)?)
    }

    async fn exists_by_isbn_and_user(
        &self,
        isbn: &str,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT EXISTS (SELECT 1 FROM books WHERE isbn = $1 AND user_id = $2)")
            .await?;
        Ok(self
            .client
            .query_one(&stmt, &[&isbn, &user_id])
            .await?
            .try_get(0)?)
    }

    async fn delete_book(&self, isbn: &str, user_id: UserId) -> Result<bool, RepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM books WHERE isbn = $1 AND user_id = $2 RETURNING isbn")
            .await?;

        let rows = self.client.query(&stmt, &[&isbn, &user_id]).await?;
        Ok(!rows.is_empty())
    }

    async fn list_books(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Book>, RepositoryError> {
        self.query_page(
            "SELECT COUNT(*) FROM books WHERE user_id = $1",
            &format!(
                "SELECT {} FROM books WHERE user_id = $1 ORDER BY title, isbn LIMIT $2 OFFSET $3",
                BOOK_COLUMNS
            ),
            &[&user_id],
            page,
        )
        .await
    }

    async fn list_books_by_genre(
        &self,
        genre_id: GenreId,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Book>, RepositoryError> {
        self.query_page(
            "SELECT COUNT(*) FROM books WHERE genre_id = $1 AND user_id = $2",
            &format!(
                "SELECT {} FROM books WHERE genre_id = $1 AND user_id = $2 \
                 ORDER BY title, isbn LIMIT $3 OFFSET $4",
                BOOK_COLUMNS
            ),
            &[&genre_id, &user_id],
            page,
        )
        .await
    }
}
