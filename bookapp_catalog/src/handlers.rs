use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{
    BookRegisterRequest, BookUpdateRequest, BooksPageQuery, CoverQuery, GenreId,
    GenreRegisterRequest, LoginRequest, PageQuery, UserGenrePath, UserId, UserIdQuery,
    UserRegisterRequest,
};
use crate::auth::Identity;
use crate::cover_upload::CoverUpload;
use crate::services::{AuthService, BookService, GenreService, UserService};

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

#[api_v2_operation]
pub async fn login(
    auth_service: Data<AuthService>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    let response = auth_service.login(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[api_v2_operation]
pub async fn register_user(
    user_service: Data<UserService>,
    request: web::Json<UserRegisterRequest>,
) -> Result<HttpResponse, Error> {
    let user = user_service.register(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(user))
}

#[api_v2_operation]
pub async fn register_book(
    identity: Identity,
    book_service: Data<BookService>,
    request: web::Json<BookRegisterRequest>,
) -> Result<HttpResponse, Error> {
    identity.ensure_owner(request.user_id)?;
    let book = book_service.register(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(book))
}

/// Partial update, served for both PATCH and PUT
#[api_v2_operation]
pub async fn update_book(
    identity: Identity,
    book_service: Data<BookService>,
    request: web::Json<BookUpdateRequest>,
) -> Result<HttpResponse, Error> {
    identity.ensure_owner(request.user_id)?;
    let book = book_service.update(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(book))
}

#[api_v2_operation]
pub async fn delete_book(
    identity: Identity,
    book_service: Data<BookService>,
    isbn: web::Path<String>,
    query: web::Query<UserIdQuery>,
) -> Result<HttpResponse, Error> {
    identity.ensure_owner(query.user_id)?;
    book_service.delete(&isbn, query.user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[api_v2_operation]
pub async fn list_books(
    identity: Identity,
    book_service: Data<BookService>,
    query: web::Query<BooksPageQuery>,
) -> Result<HttpResponse, Error> {
    let query = query.into_inner();
    identity.ensure_owner(query.user_id)?;
    let page = book_service
        .find_paginated(
            query.user_id,
            PageQuery {
                page: query.page,
                size: query.size,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[api_v2_operation]
pub async fn get_book(
    identity: Identity,
    book_service: Data<BookService>,
    isbn: web::Path<String>,
    query: web::Query<UserIdQuery>,
) -> Result<HttpResponse, Error> {
    identity.ensure_owner(query.user_id)?;
    let book = book_service
        .find_by_isbn_and_user(&isbn, query.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(book))
}

#[api_v2_operation]
pub async fn list_books_by_genre(
    identity: Identity,
    book_service: Data<BookService>,
    path: web::Path<UserGenrePath>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, Error> {
    identity.ensure_owner(path.user_id)?;
    let page = book_service
        .find_by_genre_and_user(path.genre_id, path.user_id, query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[api_v2_operation]
pub async fn update_cover(
    identity: Identity,
    book_service: Data<BookService>,
    isbn: web::Path<String>,
    query: web::Query<UserIdQuery>,
    upload: CoverUpload,
) -> Result<HttpResponse, Error> {
    identity.ensure_owner(query.user_id)?;
    let book = book_service
        .update_cover_image(&isbn, query.user_id, upload.bytes, &upload.content_type)
        .await?;
    Ok(HttpResponse::Ok().json(book))
}

#[api_v2_operation]
pub async fn get_cover(
    identity: Identity,
    book_service: Data<BookService>,
    query: web::Query<CoverQuery>,
) -> Result<HttpResponse, Error> {
    identity.ensure_owner(query.user_id)?;
    let cover = book_service
        .get_cover_image(query.user_id, &query.path)
        .await?;
    Ok(HttpResponse::Ok()
        .content_type(cover.content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Inline,
            parameters: vec![DispositionParam::Filename(cover.file_name)],
        })
        .body(cover.bytes))
}

#[api_v2_operation]
pub async fn register_genre(
    identity: Identity,
    genre_service: Data<GenreService>,
    request: web::Json<GenreRegisterRequest>,
) -> Result<HttpResponse, Error> {
    identity.ensure_owner(request.user_id)?;
    let genre = genre_service.register(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(genre))
}

#[api_v2_operation]
pub async fn list_genres(
    identity: Identity,
    genre_service: Data<GenreService>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, Error> {
    let user_id = user_id.into_inner();
    identity.ensure_owner(user_id)?;
    let genres = genre_service.list_by_user(user_id).await?;
    Ok(HttpResponse::Ok().json(genres))
}

#[api_v2_operation]
pub async fn delete_genre(
    identity: Identity,
    genre_service: Data<GenreService>,
    genre_id: web::Path<GenreId>,
    query: web::Query<UserIdQuery>,
) -> Result<HttpResponse, Error> {
    identity.ensure_owner(query.user_id)?;
    genre_service
        .delete(genre_id.into_inner(), query.user_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod handler_tests {
    use std::sync::Arc;

    use actix_http::Request;
    use actix_web::body::MessageBody;
    use actix_web::dev::{Service, ServiceResponse};
    use actix_web::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use actix_web::http::StatusCode;
    use actix_web::middleware::from_fn;
    use actix_web::{test, App};
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use paperclip::actix::OpenApiExt;
    use serde_json::{json, Value};

    use crate::app_config::{config_app, CatalogServices};
    use crate::auth::{authentication_filter, Claims};
    use crate::error::{json_error_handler, path_error_handler, query_error_handler};
    use crate::repository::InMemoryRepository;
    use crate::services::services_test_support::test_settings;
    use crate::settings::{IsbnScope, Settings};

    struct TestApp<S> {
        service: S,
        settings: Settings,
        _upload_dir: tempfile::TempDir,
    }

    async fn test_app() -> TestApp<
        impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>,
    > {
        let upload_dir = tempfile::tempdir().unwrap();
        let settings = test_settings(IsbnScope::Global, &upload_dir);
        let services = CatalogServices::new(&settings, Arc::new(InMemoryRepository::default()));

        let service = test::init_service(
            App::new()
                .wrap_api()
                .app_data(services.auth.clone())
                .app_data(services.users.clone())
                .app_data(services.genres.clone())
                .app_data(services.books.clone())
                .app_data(actix_web::web::JsonConfig::default().error_handler(json_error_handler))
                .app_data(actix_web::web::QueryConfig::default().error_handler(query_error_handler))
                .app_data(actix_web::web::PathConfig::default().error_handler(path_error_handler))
                .wrap(from_fn(authentication_filter))
                .configure(config_app)
                .with_json_spec_at("/apispec/v2")
                .build(),
        )
        .await;

        TestApp {
            service,
            settings,
            _upload_dir: upload_dir,
        }
    }

    async fn body_json<B: MessageBody>(response: ServiceResponse<B>) -> Value {
        let bytes = test::read_body(response).await;
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Registers the user and returns its id with a bearer token
    async fn register_and_login<S, B>(app: &TestApp<S>, username: &str) -> (i64, String)
    where
        S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
        B: MessageBody,
    {
        let email = format!("{}@example.com", username);
        let request = test::TestRequest::post()
            .uri("/api/v1/users/register")
            .set_json(json!({"username": username, "email": email, "password": "secret1"}))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let user = body_json(response).await;
        assert!(user.get("password").is_none());

        let request = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({"email": email, "password": "secret1"}))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await["token"].as_str().unwrap().to_string();

        (user["id"].as_i64().unwrap(), format!("Bearer {}", token))
    }

    async fn register_genre<S, B>(app: &TestApp<S>, token: &str, user_id: i64, name: &str) -> i64
    where
        S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
        B: MessageBody,
    {
        let request = test::TestRequest::post()
            .uri("/api/v1/genres")
            .insert_header((AUTHORIZATION, token))
            .set_json(json!({"name": name, "userId": user_id}))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_i64().unwrap()
    }

    fn book_json(isbn: &str, genre_id: i64, user_id: i64) -> Value {
        json!({
            "isbn": isbn,
            "title": "The Hobbit",
            "genreId": genre_id,
            "publishedDate": "1937-09-21",
            "synopsis": "A hobbit goes on an unexpected journey",
            "userId": user_id,
        })
    }

    fn multipart_request(uri: &str, token: &str, content_type: &str, data: &[u8]) -> Request {
        let boundary = "cover-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cover\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        test::TestRequest::patch()
            .uri(uri)
            .insert_header((AUTHORIZATION, token))
            .insert_header((
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request()
    }

    #[actix_web::test]
    async fn test_public_endpoints_bypass_filter() {
        let app = test_app().await;

        let response =
            test::call_service(&app.service, test::TestRequest::get().uri("/health").to_request())
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        let request = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({"email": "nobody@example.com", "password": "secret1"}))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({"status": "error", "message": "Invalid email or password"})
        );

        register_and_login(&app, "anna").await;
    }

    #[actix_web::test]
    async fn test_filter_rejects_bad_tokens() {
        let app = test_app().await;
        let (user_id, _) = register_and_login(&app, "anna").await;
        let uri = format!("/api/v1/genres/user/{}", user_id);

        let response =
            test::call_service(&app.service, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, json!({"error": "Token is required"}));

        let request = test::TestRequest::get()
            .uri(&uri)
            .insert_header((AUTHORIZATION, "Basic abc"))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Invalid or malformed token"})
        );

        let request = test::TestRequest::get()
            .uri(&uri)
            .insert_header((AUTHORIZATION, "Bearer not-a-token"))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(body_json(response).await, json!({"error": "Malformed token"}));

        let now = Utc::now().timestamp();
        let expired = encode(
            &Header::default(),
            &Claims {
                sub: "anna@example.com".to_string(),
                user_id: user_id as i32,
                username: "anna".to_string(),
                iat: now - 7200,
                exp: now - 3600,
            },
            &EncodingKey::from_secret(app.settings.auth.jwt_secret.as_bytes()),
        )
        .unwrap();
        let request = test::TestRequest::get()
            .uri(&uri)
            .insert_header((AUTHORIZATION, format!("Bearer {}", expired)))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, json!({"error": "Token has expired"}));

        let forged = encode(
            &Header::default(),
            &Claims {
                sub: "anna@example.com".to_string(),
                user_id: user_id as i32,
                username: "anna".to_string(),
                iat: now,
                exp: now + 3600,
            },
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .unwrap();
        let request = test::TestRequest::get()
            .uri(&uri)
            .insert_header((AUTHORIZATION, format!("Bearer {}", forged)))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(
            body_json(response).await,
            json!({"error": "Invalid token signature"})
        );
    }

    #[actix_web::test]
    async fn test_register_book_then_conflict() {
        let app = test_app().await;
        let (user_id, token) = register_and_login(&app, "anna").await;
        let genre_id = register_genre(&app, &token, user_id, "Fiction").await;

        let request = test::TestRequest::post()
            .uri("/api/v1/books")
            .insert_header((AUTHORIZATION, token.as_str()))
            .set_json(book_json("1234567890", genre_id, user_id))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let book = body_json(response).await;
        assert_eq!(book["genre"], "Fiction");
        assert_eq!(book["publishedDate"], "1937-09-21");
        assert!(book.get("createdAt").is_some());

        let request = test::TestRequest::post()
            .uri("/api/v1/books")
            .insert_header((AUTHORIZATION, token.as_str()))
            .set_json(book_json("1234567890", genre_id, user_id))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["status"], "error");

        let request = test::TestRequest::get()
            .uri(&format!("/api/v1/books?userId={}&size=1", user_id))
            .insert_header((AUTHORIZATION, token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_json(response).await;
        assert_eq!(page["totalElements"], 1);
        assert_eq!(page["content"][0]["isbn"], "1234567890");

        let request = test::TestRequest::put()
            .uri("/api/v1/books")
            .insert_header((AUTHORIZATION, token.as_str()))
            .set_json(json!({"isbn": "1234567890", "userId": user_id, "title": "There and Back Again"}))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["title"], "There and Back Again");

        let request = test::TestRequest::delete()
            .uri(&format!("/api/v1/books/1234567890?userId={}", user_id))
            .insert_header((AUTHORIZATION, token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let request = test::TestRequest::get()
            .uri(&format!("/api/v1/books/1234567890?userId={}", user_id))
            .insert_header((AUTHORIZATION, token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_invalid_requests() {
        let app = test_app().await;
        let (user_id, token) = register_and_login(&app, "anna").await;

        let request = test::TestRequest::post()
            .uri("/api/v1/genres")
            .insert_header((AUTHORIZATION, token.as_str()))
            .set_json(json!({"name": "ab", "userId": user_id}))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"name": "Genre name must be between 3 and 30 characters long"})
        );

        let request = test::TestRequest::post()
            .uri("/api/v1/books")
            .insert_header((AUTHORIZATION, token.as_str()))
            .insert_header((CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["status"], "error");

        let request = test::TestRequest::get()
            .uri("/api/v1/books?userId=abc")
            .insert_header((AUTHORIZATION, token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Acting on behalf of another user
        let request = test::TestRequest::get()
            .uri(&format!("/api/v1/genres/user/{}", user_id + 1))
            .insert_header((AUTHORIZATION, token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_cover_upload_and_access() {
        let app = test_app().await;
        let (anna, anna_token) = register_and_login(&app, "anna").await;
        let (bob, bob_token) = register_and_login(&app, "bob").await;
        let genre_id = register_genre(&app, &bob_token, bob, "Fiction").await;

        let request = test::TestRequest::post()
            .uri("/api/v1/books")
            .insert_header((AUTHORIZATION, bob_token.as_str()))
            .set_json(book_json("9876543210", genre_id, bob))
            .to_request();
        assert_eq!(
            test::call_service(&app.service, request).await.status(),
            StatusCode::CREATED
        );

        let request = multipart_request(
            &format!("/api/v1/books/9876543210/cover?userId={}", bob),
            &bob_token,
            "image/png",
            b"png-bytes",
        );
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["coverImagePath"],
            "9876543210/cover.png"
        );

        let request = multipart_request(
            &format!("/api/v1/books/9876543210/cover?userId={}", bob),
            &bob_token,
            "text/plain",
            b"text",
        );
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Only JPG or PNG images are allowed"
        );

        let request = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/books/cover?userId={}&path=9876543210/cover.png",
                bob
            ))
            .insert_header((AUTHORIZATION, bob_token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap().to_str().unwrap(),
            "image/png"
        );
        assert_eq!(test::read_body(response).await.as_ref(), b"png-bytes");

        // Anna does not own the book
        let request = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/books/cover?userId={}&path=9876543210/cover.png",
                anna
            ))
            .insert_header((AUTHORIZATION, anna_token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/books/cover?userId={}&path=../secret.png",
                bob
            ))
            .insert_header((AUTHORIZATION, bob_token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::delete()
            .uri(&format!("/api/v1/genres/{}?userId={}", genre_id, bob))
            .insert_header((AUTHORIZATION, bob_token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let request = test::TestRequest::get()
            .uri(&format!("/api/v1/books/9876543210?userId={}", bob))
            .insert_header((AUTHORIZATION, bob_token.as_str()))
            .to_request();
        let response = test::call_service(&app.service, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
