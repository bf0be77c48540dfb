use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::api::UserId;
use crate::settings::{IsbnScope, StorageSettings};

const STAGING_PREFIX: &str = ".staged-cover";
const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("{0}")]
    InvalidImage(String),

    #[error("Image {0} not found")]
    NotFound(String),

    #[error("Storage failure while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ImageStoreError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Book a stored cover path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverOwner<'a> {
    /// Only known when covers are kept per user
    pub user_id: Option<UserId>,
    pub isbn: &'a str,
}

/// Keeps at most one cover file per book.
/// With a global isbn scope covers live in `<upload_dir>/<isbn>/`,
/// with a per user scope in `<upload_dir>/<user_id>/<isbn>/`
#[derive(Debug, Clone)]
pub struct ImageStore {
    upload_dir: PathBuf,
    max_cover_bytes: usize,
    isbn_scope: IsbnScope,
}

impl ImageStore {
    pub fn new(settings: &StorageSettings, isbn_scope: IsbnScope) -> Self {
        Self {
            upload_dir: settings.upload_dir.clone(),
            max_cover_bytes: settings.max_cover_bytes,
            isbn_scope,
        }
    }

    pub fn isbn_scope(&self) -> IsbnScope {
        self.isbn_scope
    }

    /// Directory of the book covers, absolute and relative to the upload directory
    fn cover_dir(&self, user_id: UserId, isbn: &str) -> Result<(PathBuf, String), ImageStoreError> {
        validate_isbn_segment(isbn)?;
        Ok(match self.isbn_scope {
            IsbnScope::Global => (self.upload_dir.join(isbn), isbn.to_string()),
            IsbnScope::PerUser => (
                self.upload_dir.join(user_id.to_string()).join(isbn),
                format!("{}/{}", user_id, isbn),
            ),
        })
    }

    /// Reads the owner out of normalized path segments, `None` if they do not match the layout
    pub fn cover_owner<'a>(&self, segments: &[&'a str]) -> Option<CoverOwner<'a>> {
        match (self.isbn_scope, segments) {
            (IsbnScope::Global, [isbn, _file_name]) => Some(CoverOwner {
                user_id: None,
                isbn: *isbn,
            }),
            (IsbnScope::PerUser, [user_id, isbn, _file_name]) => Some(CoverOwner {
                user_id: Some(user_id.parse().ok()?),
                isbn: *isbn,
            }),
            _ => None,
        }
    }

    pub fn validate_image(&self, bytes: &[u8], content_type: &str) -> Result<(), ImageStoreError> {
        if bytes.is_empty() {
            return Err(ImageStoreError::InvalidImage("File is empty".to_string()));
        }
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.to_ascii_lowercase().as_str()) {
            return Err(ImageStoreError::InvalidImage(
                "Only JPG or PNG images are allowed".to_string(),
            ));
        }
        if bytes.len() > self.max_cover_bytes {
            return Err(ImageStoreError::InvalidImage(format!(
                "Maximum allowed file size is {}",
                human_size(self.max_cover_bytes)
            )));
        }
        Ok(())
    }

    /// Writes the cover and returns its path relative to the upload directory, e.g. `1234567890/cover.png`.
    /// The new file is staged next to the old ones and renamed into place once they are removed.
    pub async fn store_cover_image(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        user_id: UserId,
        isbn: &str,
    ) -> Result<String, ImageStoreError> {
        self.validate_image(&bytes, content_type)?;
        let (isbn_dir, relative_dir) = self.cover_dir(user_id, isbn)?;

        let file_name = if content_type.eq_ignore_ascii_case("image/png") {
            "cover.png"
        } else {
            "cover.jpg"
        };
        tokio::task::spawn_blocking(move || write_cover(&isbn_dir, file_name, &bytes))
            .await
            .map_err(|err| ImageStoreError::io("waiting for cover write", io::Error::other(err)))??;

        tracing::info!("Stored cover image {} for isbn {}", file_name, isbn);
        Ok(format!("{}/{}", relative_dir, file_name))
    }

    /// Reads a stored cover, the path has to be already normalized
    pub async fn load_cover_image(&self, relative_path: &str) -> Result<Vec<u8>, ImageStoreError> {
        let path = self.upload_dir.join(relative_path);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ImageStoreError::NotFound(relative_path.to_string()))
            }
            Err(err) => Err(ImageStoreError::io(
                format!("reading {}", path.display()),
                err,
            )),
        }
    }

    /// Removes the whole cover directory of the book, missing directory is not an error
    pub async fn remove_cover_images(
        &self,
        user_id: UserId,
        isbn: &str,
    ) -> Result<(), ImageStoreError> {
        let (isbn_dir, _) = self.cover_dir(user_id, isbn)?;
        match tokio::fs::remove_dir_all(&isbn_dir).await {
            Ok(()) => {
                tracing::info!("Removed cover images of isbn {}", isbn);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ImageStoreError::io(
                format!("removing {}", isbn_dir.display()),
                err,
            )),
        }
    }
}

fn validate_isbn_segment(isbn: &str) -> Result<(), ImageStoreError> {
    if isbn.is_empty() || isbn.contains(['/', '\\']) || isbn.contains("..") {
        return Err(ImageStoreError::InvalidImage(format!(
            "Invalid isbn for cover image: {}",
            isbn
        )));
    }
    Ok(())
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

fn write_cover(isbn_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
    std::fs::create_dir_all(isbn_dir)
        .map_err(|err| ImageStoreError::io(format!("creating {}", isbn_dir.display()), err))?;

    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(isbn_dir)
        .map_err(|err| ImageStoreError::io("staging cover image", err))?;
    staged
        .write_all(bytes)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|err| ImageStoreError::io("writing staged cover image", err))?;

    let entries = std::fs::read_dir(isbn_dir)
        .map_err(|err| ImageStoreError::io(format!("listing {}", isbn_dir.display()), err))?;
    for entry in entries {
        let entry = entry.map_err(|err| ImageStoreError::io("listing cover images", err))?;
        let staged_by_upload = entry
            .file_name()
            .to_string_lossy()
            .starts_with(STAGING_PREFIX);
        if staged_by_upload || !entry.path().is_file() {
            continue;
        }
        std::fs::remove_file(entry.path()).map_err(|err| {
            ImageStoreError::io(format!("removing {}", entry.path().display()), err)
        })?;
    }

    let target = isbn_dir.join(file_name);
    staged
        .persist(&target)
        .map_err(|err| ImageStoreError::io(format!("moving cover to {}", target.display()), err.error))?;
    Ok(())
}
