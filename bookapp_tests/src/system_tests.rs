use bookapp_catalog::api::{
    BookRegisterRequest, BookUpdateRequest, GenreRegisterRequest, UserRegisterRequest,
};
use bookapp_catalog::client::BookAppClient;
use chrono::NaiveDate;

fn catalog_url() -> String {
    std::env::var("BOOKAPP_URL").unwrap_or("http://127.0.0.1:8080".to_string())
}

/// Registers a fresh user and returns the logged in client with the user id
async fn logged_in_client() -> (BookAppClient, i32) {
    let mut client = BookAppClient::new(&catalog_url()).expect("Failed to create client");
    let suffix: u32 = rand::random();
    let email = format!("user{}@example.com", suffix);

    let user = client
        .register_user(&UserRegisterRequest {
            username: format!("user{}", suffix),
            email: email.clone(),
            password: "secret1".to_string(),
        })
        .await
        .expect("Failed to register user");

    client
        .login(&email, "secret1")
        .await
        .expect("Failed to login");

    (client, user.id)
}

fn random_isbn() -> String {
    format!("{:013}", rand::random::<u64>() % 10_000_000_000_000)
}

#[tokio::test]
/// Simple test for the catalog
/// Registers and logs in a user
/// Creates a genre and a book
/// Patches the book
/// Lists books of the user and of the genre
/// Uploads a cover and downloads it back
/// Deletes the genre which removes the book
async fn bookapp_catalog_e2e_test() {
    let (client, user_id) = logged_in_client().await;

    // GENRE
    let genre = client
        .register_genre(&GenreRegisterRequest {
            name: "Fiction".to_string(),
            user_id,
        })
        .await
        .expect("Failed to register genre");
    let genres = client
        .list_genres(user_id)
        .await
        .expect("Failed to list genres");
    assert_eq!(genres, vec![genre.clone()]);

    // BOOK
    let isbn = random_isbn();
    let book = client
        .register_book(&BookRegisterRequest {
            isbn: isbn.clone(),
            title: "The Hobbit".to_string(),
            genre_id: genre.id,
            published_date: NaiveDate::from_ymd_opt(1937, 9, 21).unwrap(),
            synopsis: "A hobbit goes on an unexpected journey".to_string(),
            user_id,
        })
        .await
        .expect("Failed to register book");
    assert_eq!(book.genre, "Fiction");

    // REGISTER AGAIN - conflict
    assert!(client
        .register_book(&BookRegisterRequest {
            isbn: isbn.clone(),
            title: "The Hobbit".to_string(),
            genre_id: genre.id,
            published_date: NaiveDate::from_ymd_opt(1937, 9, 21).unwrap(),
            synopsis: "A hobbit goes on an unexpected journey".to_string(),
            user_id,
        })
        .await
        .is_err());

    // PATCH
    let updated = client
        .update_book(&BookUpdateRequest {
            isbn: isbn.clone(),
            user_id,
            title: Some("There and Back Again".to_string()),
            ..BookUpdateRequest::default()
        })
        .await
        .expect("Failed to update book");
    assert_eq!(updated.title, "There and Back Again");
    assert_eq!(updated.synopsis, book.synopsis);
    assert_eq!(updated.created_at, book.created_at);

    // LIST
    let page = client
        .list_books(user_id, 0, 5)
        .await
        .expect("Failed to list books");
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content, vec![updated.clone()]);

    let by_genre = client
        .list_books_by_genre(user_id, genre.id, 0, 5)
        .await
        .expect("Failed to list books of genre");
    assert_eq!(by_genre.content, vec![updated]);

    // COVER
    let with_cover = client
        .upload_cover(&isbn, user_id, b"png-bytes".to_vec(), "image/png")
        .await
        .expect("Failed to upload cover");
    let cover_path = with_cover
        .cover_image_path
        .expect("Cover path not returned");
    assert_eq!(cover_path, format!("{}/cover.png", isbn));

    let cover = client
        .get_cover(user_id, &cover_path)
        .await
        .expect("Failed to get cover")
        .expect("Cover not found");
    assert_eq!(cover, b"png-bytes".to_vec());

    // DELETE GENRE - removes the book as well
    assert!(client
        .delete_genre(genre.id, user_id)
        .await
        .expect("Failed to delete genre"));
    assert_eq!(
        client
            .get_book(&isbn, user_id)
            .await
            .expect("Failed to get book"),
        None
    );
}

#[tokio::test]
/// Another user can neither read books nor covers of the first one
async fn bookapp_catalog_ownership_e2e_test() {
    let (owner, owner_id) = logged_in_client().await;
    let (other, other_id) = logged_in_client().await;

    let genre = owner
        .register_genre(&GenreRegisterRequest {
            name: "Drama".to_string(),
            user_id: owner_id,
        })
        .await
        .expect("Failed to register genre");
    let isbn = random_isbn();
    owner
        .register_book(&BookRegisterRequest {
            isbn: isbn.clone(),
            title: "Hamlet".to_string(),
            genre_id: genre.id,
            published_date: NaiveDate::from_ymd_opt(1603, 1, 1).unwrap(),
            synopsis: "The prince of Denmark seeks revenge".to_string(),
            user_id: owner_id,
        })
        .await
        .expect("Failed to register book");
    owner
        .upload_cover(&isbn, owner_id, b"jpg-bytes".to_vec(), "image/jpeg")
        .await
        .expect("Failed to upload cover");

    assert_eq!(
        other
            .get_book(&isbn, other_id)
            .await
            .expect("Failed to get book"),
        None
    );
    assert!(other
        .get_cover(other_id, &format!("{}/cover.jpg", isbn))
        .await
        .is_err());
    assert!(!other
        .delete_book(&isbn, other_id)
        .await
        .expect("Failed to delete book"));

    assert!(owner
        .delete_book(&isbn, owner_id)
        .await
        .expect("Failed to delete book"));
}
