use chrono::{NaiveDate, NaiveDateTime};
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

pub type UserId = i32;
pub type GenreId = i32;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Apiv2Schema)]
pub struct LoginRequest {
    #[validate(email(message = "Email must be valid"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password cannot be blank"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Apiv2Schema)]
pub struct UserRegisterRequest {
    #[validate(length(
        min = 2,
        max = 50,
        message = "Username must be between 2 and 50 characters long"
    ))]
    pub username: String,
    #[validate(email(message = "Email must be valid"))]
    pub email: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Registered user, never carries the password
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct GenreRegisterRequest {
    #[validate(length(
        min = 3,
        max = 30,
        message = "Genre name must be between 3 and 30 characters long"
    ))]
    pub name: String,
    #[validate(range(min = 1, message = "User ID must be greater than or equal to 1"))]
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct GenreView {
    pub id: GenreId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BookRegisterRequest {
    #[validate(length(
        min = 10,
        max = 13,
        message = "ISBN must be between 10 and 13 characters long"
    ))]
    pub isbn: String,
    #[validate(length(
        min = 2,
        max = 100,
        message = "Title must be between 2 and 100 characters long"
    ))]
    pub title: String,
    #[validate(range(min = 1, message = "Genre ID must be greater than or equal to 1"))]
    pub genre_id: GenreId,
    pub published_date: NaiveDate,
    #[validate(length(
        min = 10,
        max = 500,
        message = "Synopsis must be between 10 and 500 characters long"
    ))]
    pub synopsis: String,
    #[validate(range(min = 1, message = "User ID must be greater than or equal to 1"))]
    pub user_id: UserId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Partial update of a book, fields left out keep their current value
pub struct BookUpdateRequest {
    #[validate(length(
        min = 10,
        max = 13,
        message = "ISBN must be between 10 and 13 characters long"
    ))]
    pub isbn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(
        min = 2,
        max = 100,
        message = "Title must be between 2 and 100 characters long"
    ))]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "Genre ID must be greater than or equal to 1"))]
    pub genre_id: Option<GenreId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(
        min = 10,
        max = 500,
        message = "Synopsis must be between 10 and 500 characters long"
    ))]
    pub synopsis: Option<String>,
    #[validate(range(min = 1, message = "User ID must be greater than or equal to 1"))]
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    pub isbn: String,
    pub title: String,
    pub genre_id: GenreId,
    /// Name of the genre the book belongs to
    pub genre: String,
    pub published_date: NaiveDate,
    pub synopsis: String,
    pub created_at: NaiveDateTime,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// One page of books, `number` is the zero based index of the page
pub struct BookPage {
    pub content: Vec<BookView>,
    pub total_elements: u64,
    pub total_pages: u64,
    pub size: u32,
    pub number: u32,
    pub number_of_elements: u32,
    pub first: bool,
    pub last: bool,
    pub empty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct UserIdQuery {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BooksPageQuery {
    pub user_id: UserId,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Apiv2Schema)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct UserGenrePath {
    pub user_id: UserId,
    pub genre_id: GenreId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct CoverQuery {
    pub user_id: UserId,
    /// Relative cover path as returned in `coverImagePath`, e.g. `1234567890/cover.png`
    pub path: String,
}

/// At least 6 characters with at least one letter and one digit
fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let long_enough = password.chars().count() >= 6;
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_letter && has_digit {
        Ok(())
    } else {
        let mut error = ValidationError::new("password_strength");
        error.message = Some(
            "Password must be at least 6 characters long and contain at least one letter and one number"
                .into(),
        );
        Err(error)
    }
}

#[cfg(test)]
mod api_tests {
    use super::*;

    #[test]
    fn test_password_strength_rules() {
        assert!(validate_password_strength("abc123").is_ok());
        assert!(validate_password_strength("abcdef").is_err());
        assert!(validate_password_strength("123456").is_err());
        assert!(validate_password_strength("a1").is_err());
    }

    #[test]
    fn test_book_update_request_accepts_missing_fields() {
        let request: BookUpdateRequest =
            serde_json::from_str(r#"{"isbn": "1234567890", "userId": 3}"#).unwrap();

        assert_eq!(request.isbn, "1234567890");
        assert_eq!(request.user_id, 3);
        assert!(request.title.is_none());
        assert!(request.genre_id.is_none());
        assert!(request.published_date.is_none());
        assert!(request.synopsis.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_book_register_request_validation_reports_fields() {
        let request = BookRegisterRequest {
            isbn: "123".to_string(),
            title: "T".to_string(),
            genre_id: 0,
            published_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            synopsis: "short".to_string(),
            user_id: 1,
        };

        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("isbn"));
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("genre_id"));
        assert!(fields.contains_key("synopsis"));
        assert!(!fields.contains_key("user_id"));
    }
}
