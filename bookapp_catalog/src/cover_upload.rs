use actix_multipart::Multipart;
use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use futures_util::{FutureExt, StreamExt};

use crate::error::ApiError;

const FILE_FIELD: &str = "file";
/// Hard cap while reading the request, the configured cover limit is checked later
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Content of the `file` field of a multipart cover upload
#[derive(Debug, Clone)]
pub struct CoverUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

async fn read_cover_upload(mut multipart: Multipart) -> Result<CoverUpload, ApiError> {
    let malformed = |err: actix_multipart::MultipartError| {
        ApiError::BadRequest(format!("Malformed multipart request: {}", err))
    };

    while let Some(field) = multipart.next().await {
        let mut field = field.map_err(malformed)?;
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();
        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(malformed)?;
            if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError::BadRequest("Uploaded file is too large".to_string()));
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(CoverUpload {
            bytes,
            content_type,
        });
    }

    Err(ApiError::BadRequest(format!(
        "Multipart field '{}' is required",
        FILE_FIELD
    )))
}

impl FromRequest for CoverUpload {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let multipart = Multipart::new(req.headers(), payload.take());
        read_cover_upload(multipart)
            .map(|result| result.map_err(actix_web::Error::from))
            .boxed_local()
    }
}

impl paperclip::v2::schema::Apiv2Schema for CoverUpload {}
impl paperclip::actix::OperationModifier for CoverUpload {}
