use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::web::Data;
use actix_web::{Error, HttpMessage, HttpResponse};
use serde_json::json;

use crate::auth::Identity;
use crate::services::AuthService;

const PUBLIC_PATHS: [&str; 3] = ["/api/v1/auth/login", "/api/v1/users/register", "/health"];

fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || path.starts_with("/apispec")
}

fn reject<B>(req: ServiceRequest, message: &str) -> ServiceResponse<EitherBody<B>> {
    req.into_response(HttpResponse::Unauthorized().json(json!({ "error": message })))
        .map_into_right_body()
}

/// Validates the bearer token of every non public request and binds the caller [`Identity`].
/// Requests with a valid token are dispatched even if no identity could be bound,
/// handlers requiring one reject them on their own.
pub async fn authentication_filter<B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    if is_public(req.path()) {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    }

    let header = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default().to_string());
    let token = match header.as_deref() {
        None => return Ok(reject(req, "Token is required")),
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => return Ok(reject(req, "Invalid or malformed token")),
        },
    };

    let Some(auth_service) = req.app_data::<Data<AuthService>>().cloned() else {
        tracing::error!("Authentication service is not registered");
        return Err(actix_web::error::ErrorInternalServerError(
            "Authentication unavailable",
        ));
    };

    let claims = match auth_service.extract_claims(&token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::info!("Rejected token for {} {}", req.path(), err);
            return Ok(reject(req, &err.to_string()));
        }
    };

    let already_bound = req.extensions().contains::<Identity>();
    if !already_bound {
        match auth_service.resolve_identity(&claims).await {
            Ok(Some(identity)) => {
                req.extensions_mut().insert(identity);
            }
            Ok(None) => tracing::warn!("Token subject {} does not match any user", claims.sub),
            Err(err) => tracing::error!("Failed to resolve identity {}", err),
        }
    }

    next.call(req).await.map(ServiceResponse::map_into_left_body)
}

#[cfg(test)]
mod middleware_tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public("/api/v1/auth/login"));
        assert!(is_public("/api/v1/users/register"));
        assert!(is_public("/health"));
        assert!(is_public("/apispec/v2"));
        assert!(!is_public("/api/v1/books"));
        assert!(!is_public("/api/v1/users/register/extra"));
    }
}
