use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::errors::ApiError;

/// Caller identity forwarded by the platform gateway, which terminates
/// authentication upstream. `x-user-id` carries the landlord uuid and
/// `x-user-role` is `admin` for operators.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl FromRequest for AuthContext {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}

fn extract(req: &HttpRequest) -> Result<AuthContext, ApiError> {
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing x-user-id header".to_string()))?;
    let user_id = Uuid::parse_str(user_id)
        .map_err(|_| ApiError::Unauthorized("x-user-id is not a valid uuid".to_string()))?;

    let is_admin = req
        .headers()
        .get("x-user-role")
        .and_then(|value| value.to_str().ok())
        .map(|role| role.eq_ignore_ascii_case("admin"))
        .unwrap_or(false);

    Ok(AuthContext { user_id, is_admin })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_rt::test]
    async fn test_extracts_identity_and_role() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header(("x-user-id", id.to_string()))
            .insert_header(("x-user-role", "admin"))
            .to_http_request();
        let ctx = extract(&req).unwrap();
        assert_eq!(ctx.user_id, id);
        assert!(ctx.is_admin);
    }

    #[actix_rt::test]
    async fn test_missing_or_bad_header_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            extract(&req),
            Err(ApiError::Unauthorized(_))
        ));

        let req = TestRequest::default()
            .insert_header(("x-user-id", "not-a-uuid"))
            .to_http_request();
        assert!(matches!(
            extract(&req),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[actix_rt::test]
    async fn test_non_admin_role_defaults_to_member() {
        let req = TestRequest::default()
            .insert_header(("x-user-id", Uuid::new_v4().to_string()))
            .insert_header(("x-user-role", "landlord"))
            .to_http_request();
        let ctx = extract(&req).unwrap();
        assert!(!ctx.is_admin);
    }
}
