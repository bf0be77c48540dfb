use std::sync::Arc;

use actix_web::web::Data;
use paperclip::actix::web;

use crate::auth::JwtService;
use crate::handlers;
use crate::image_store::ImageStore;
use crate::repository::{BooksRepository, GenresRepository, UsersRepository};
use crate::services::{AuthService, BookService, GenreService, UserService};
use crate::settings::Settings;

/// Services shared by all workers, registered as app data
#[derive(Clone)]
pub struct CatalogServices {
    pub auth: Data<AuthService>,
    pub users: Data<UserService>,
    pub genres: Data<GenreService>,
    pub books: Data<BookService>,
}

impl CatalogServices {
    pub fn new<R>(settings: &Settings, repository: Arc<R>) -> Self
    where
        R: UsersRepository + GenresRepository + BooksRepository + 'static,
    {
        let image_store = ImageStore::new(&settings.storage, settings.catalog.isbn_scope);
        Self {
            auth: Data::new(AuthService::new(
                repository.clone(),
                JwtService::new(&settings.auth),
            )),
            users: Data::new(UserService::new(
                repository.clone(),
                settings.auth.bcrypt_cost,
            )),
            genres: Data::new(GenreService::new(
                repository.clone(),
                repository.clone(),
                repository.clone(),
                image_store.clone(),
            )),
            books: Data::new(BookService::new(
                repository.clone(),
                repository.clone(),
                repository,
                image_store,
                settings.catalog.clone(),
            )),
        }
    }
}

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api/v1")
                .service(web::resource("/auth/login").route(web::post().to(handlers::login)))
                .service(
                    web::resource("/users/register")
                        .route(web::post().to(handlers::register_user)),
                )
                .service(
                    web::scope("/books")
                        .service(
                            web::resource("")
                                .route(web::get().to(handlers::list_books))
                                .route(web::post().to(handlers::register_book))
                                .route(web::patch().to(handlers::update_book))
                                .route(web::put().to(handlers::update_book)),
                        )
                        // Registered before /{isbn} so "cover" is not taken for an isbn
                        .service(web::resource("/cover").route(web::get().to(handlers::get_cover)))
                        .service(
                            web::resource("/user/{userId}/genre/{genreId}")
                                .route(web::get().to(handlers::list_books_by_genre)),
                        )
                        .service(
                            web::resource("/{isbn}")
                                .route(web::get().to(handlers::get_book))
                                .route(web::delete().to(handlers::delete_book)),
                        )
                        .service(
                            web::resource("/{isbn}/cover")
                                .route(web::patch().to(handlers::update_cover)),
                        ),
                )
                .service(
                    web::scope("/genres")
                        .service(
                            web::resource("").route(web::post().to(handlers::register_genre)),
                        )
                        .service(
                            web::resource("/user/{userId}")
                                .route(web::get().to(handlers::list_genres)),
                        )
                        .service(
                            web::resource("/{genreId}")
                                .route(web::delete().to(handlers::delete_genre)),
                        ),
                ),
        );
}
