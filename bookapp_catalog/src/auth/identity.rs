use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use futures_util::future::{ready, Ready};

use crate::api::UserId;
use crate::error::ApiError;

/// Authenticated caller, bound to the request by the authentication filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
}

impl Identity {
    /// Requests may only act on resources of the authenticated user
    pub fn ensure_owner(&self, user_id: UserId) -> Result<(), ApiError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "User {} cannot access resources of user {}",
                self.user_id, user_id
            )))
        }
    }
}

impl FromRequest for Identity {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Identity>()
                .cloned()
                .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()).into()),
        )
    }
}

impl paperclip::v2::schema::Apiv2Schema for Identity {}
impl paperclip::actix::OperationModifier for Identity {}

#[cfg(test)]
mod identity_tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn test_ensure_owner() {
        let identity = Identity {
            user_id: 1,
            email: "anna@example.com".to_string(),
        };
        assert!(identity.ensure_owner(1).is_ok());
        assert!(matches!(
            identity.ensure_owner(2),
            Err(ApiError::Forbidden(..))
        ));
    }

    #[actix_web::test]
    async fn test_extractor_requires_bound_identity() {
        let (req, mut payload) = TestRequest::default().to_http_parts();
        assert!(Identity::from_request(&req, &mut payload).await.is_err());

        let identity = Identity {
            user_id: 3,
            email: "bob@example.com".to_string(),
        };
        req.extensions_mut().insert(identity.clone());
        assert_eq!(
            Identity::from_request(&req, &mut payload).await.unwrap(),
            identity
        );
    }
}
