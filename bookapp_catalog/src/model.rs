use chrono::{NaiveDate, NaiveDateTime};

use crate::api::{GenreId, UserId};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// bcrypt hash of the password
    pub password_hash: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Book {
    pub isbn: String,
    pub title: String,
    pub genre_id: GenreId,
    pub published_date: NaiveDate,
    pub synopsis: String,
    /// Set once when the book is registered
    pub created_at: NaiveDateTime,
    pub user_id: UserId,
    pub cover_image_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }
}

/// Slice of results together with the number of all matching rows
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}
