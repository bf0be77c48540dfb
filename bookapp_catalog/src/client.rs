use anyhow::{bail, Context};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_tracing::TracingMiddleware;
use serde::de::DeserializeOwned;

use crate::api::{
    BookPage, BookRegisterRequest, BookUpdateRequest, BookView, GenreId, GenreRegisterRequest,
    GenreView, LoginRequest, LoginResponse, UserId, UserRegisterRequest, UserView,
};

/// Typed client of the catalog http api.
/// Calls other than register and login need a token, see [`BookAppClient::login`]
pub struct BookAppClient {
    url: String,
    client: ClientWithMiddleware,
    token: Option<String>,
}

async fn error_text(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{} {}", status, body)
}

async fn json_or_none<T: DeserializeOwned>(response: Response) -> anyhow::Result<Option<T>> {
    if response.status() == StatusCode::NOT_FOUND {
        Ok(None)
    } else if response.status().is_success() {
        Ok(Some(response.json().await?))
    } else {
        bail!("Request failed {}", error_text(response).await)
    }
}

impl BookAppClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.to_string(),
            client,
            token: None,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// Calls POST /api/v1/users/register endpoint
    pub async fn register_user(&self, request: &UserRegisterRequest) -> anyhow::Result<UserView> {
        let response = self
            .client
            .post(format!("{}/api/v1/users/register", self.url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to register user {}", error_text(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls POST /api/v1/auth/login endpoint
    /// Keeps the returned token for the following calls
    pub async fn login(&mut self, email: &str, password: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/api/v1/auth/login", self.url))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to login {}", error_text(response).await)
        }
        let login: LoginResponse = response.json().await?;
        self.token = Some(login.token);
        Ok(())
    }

    /// Calls POST /api/v1/genres endpoint
    pub async fn register_genre(&self, request: &GenreRegisterRequest) -> anyhow::Result<GenreView> {
        let response = self
            .authorized(self.client.post(format!("{}/api/v1/genres", self.url)))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to register genre {}", error_text(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /api/v1/genres/user/{user_id} endpoint
    pub async fn list_genres(&self, user_id: UserId) -> anyhow::Result<Vec<GenreView>> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/api/v1/genres/user/{}", self.url, user_id)),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to list genres {}", error_text(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls DELETE /api/v1/genres/{genre_id} endpoint
    /// Returns false if the genre was not found
    pub async fn delete_genre(&self, genre_id: GenreId, user_id: UserId) -> anyhow::Result<bool> {
        let response = self
            .authorized(self.client.delete(format!(
                "{}/api/v1/genres/{}?userId={}",
                self.url, genre_id, user_id
            )))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            bail!("Failed to delete genre {}", error_text(response).await)
        }
    }

    /// Calls POST /api/v1/books endpoint
    pub async fn register_book(&self, request: &BookRegisterRequest) -> anyhow::Result<BookView> {
        let response = self
            .authorized(self.client.post(format!("{}/api/v1/books", self.url)))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to register book {}", error_text(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls PATCH /api/v1/books endpoint
    pub async fn update_book(&self, request: &BookUpdateRequest) -> anyhow::Result<BookView> {
        let response = self
            .authorized(self.client.patch(format!("{}/api/v1/books", self.url)))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to update book {}", error_text(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /api/v1/books/{isbn} endpoint
    /// Returns None if the user has no such book
    pub async fn get_book(&self, isbn: &str, user_id: UserId) -> anyhow::Result<Option<BookView>> {
        let response = self
            .authorized(self.client.get(format!(
                "{}/api/v1/books/{}?userId={}",
                self.url, isbn, user_id
            )))
            .send()
            .await?;
        json_or_none(response).await
    }

    /// Calls DELETE /api/v1/books/{isbn} endpoint
    /// Returns false if the book was not found
    pub async fn delete_book(&self, isbn: &str, user_id: UserId) -> anyhow::Result<bool> {
        let response = self
            .authorized(self.client.delete(format!(
                "{}/api/v1/books/{}?userId={}",
                self.url, isbn, user_id
            )))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            bail!("Failed to delete book {}", error_text(response).await)
        }
    }

    /// Calls GET /api/v1/books endpoint
    pub async fn list_books(&self, user_id: UserId, page: u32, size: u32) -> anyhow::Result<BookPage> {
        let response = self
            .authorized(self.client.get(format!(
                "{}/api/v1/books?userId={}&page={}&size={}",
                self.url, user_id, page, size
            )))
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to list books {}", error_text(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /api/v1/books/user/{user_id}/genre/{genre_id} endpoint
    pub async fn list_books_by_genre(
        &self,
        user_id: UserId,
        genre_id: GenreId,
        page: u32,
        size: u32,
    ) -> anyhow::Result<BookPage> {
        let response = self
            .authorized(self.client.get(format!(
                "{}/api/v1/books/user/{}/genre/{}?page={}&size={}",
                self.url, user_id, genre_id, page, size
            )))
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to list books of genre {}", error_text(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls PATCH /api/v1/books/{isbn}/cover endpoint with a multipart `file` field
    pub async fn upload_cover(
        &self,
        isbn: &str,
        user_id: UserId,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<BookView> {
        let part = Part::bytes(bytes)
            .file_name("cover")
            .mime_str(content_type)
            .context("Invalid content type")?;
        let response = self
            .authorized(self.client.patch(format!(
                "{}/api/v1/books/{}/cover?userId={}",
                self.url, isbn, user_id
            )))
            .multipart(Form::new().part("file", part))
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to upload cover {}", error_text(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /api/v1/books/cover endpoint
    /// Returns None if the image does not exist
    pub async fn get_cover(&self, user_id: UserId, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/api/v1/books/cover", self.url))
                    .query(&[("userId", user_id.to_string()), ("path", path.to_string())]),
            )
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.bytes().await?.to_vec()))
        } else {
            bail!("Failed to get cover {}", error_text(response).await)
        }
    }
}
