use actix_web::{web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ApiError;
use crate::handlers::auth::AuthContext;
use crate::models::common::ApiResponse;
use crate::models::package::{CreatePackageRequest, Package, UpdatePackageRequest};
use crate::services::database::DatabaseService;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/packages")
            .route("", web::post().to(create))
            .route("", web::get().to(list))
            .route("/{id}", web::put().to(update))
            .route("/{id}", web::get().to(detail)),
    );
}

fn require_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.is_admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "package management requires operator access".to_string(),
        ))
    }
}

async fn create(
    auth: AuthContext,
    db: web::Data<DatabaseService>,
    body: web::Json<CreatePackageRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&auth)?;
    let request = body.into_inner();
    request
        .validate()
        .map_err(|err| ApiError::Validation(err.to_string()))?;

    let package = Package::new(request);
    db.create_package(&package).await?;
    log::info!("package '{}' created ({})", package.name, package.id);
    Ok(HttpResponse::Created().json(ApiResponse::success(package)))
}

async fn update(
    auth: AuthContext,
    db: web::Data<DatabaseService>,
    path: web::Path<Uuid>,
    body: web::Json<UpdatePackageRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&auth)?;
    let request = body.into_inner();
    request
        .validate()
        .map_err(|err| ApiError::Validation(err.to_string()))?;

    let mut package = db
        .get_package(&path.into_inner())
        .await?
        .ok_or_else(|| ApiError::NotFound("package not found".to_string()))?;
    package.apply_update(request);
    db.update_package(&package).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(package)))
}

#[derive(Debug, serde::Deserialize)]
struct ListQuery {
    all: Option<bool>,
}

/// Landlords browse the active catalog; operators can include retired
/// packages with `?all=true`.
async fn list(
    auth: AuthContext,
    db: web::Data<DatabaseService>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let only_active = !(auth.is_admin && query.all.unwrap_or(false));
    let packages = db.list_packages(only_active).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(packages)))
}

async fn detail(
    _auth: AuthContext,
    db: web::Data<DatabaseService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let package = db
        .get_package(&path.into_inner())
        .await?
        .ok_or_else(|| ApiError::NotFound("package not found".to_string()))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(package)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    async fn setup() -> web::Data<DatabaseService> {
        web::Data::new(DatabaseService::new("memory://").await.unwrap())
    }

    macro_rules! spawn_app {
        ($db:expr) => {
            test::init_service(
                App::new()
                    .app_data($db.clone())
                    .service(web::scope("/api/v1").configure(configure)),
            )
            .await
        };
    }

    fn admin_headers(req: test::TestRequest) -> test::TestRequest {
        req.insert_header(("x-user-id", Uuid::new_v4().to_string()))
            .insert_header(("x-user-role", "admin"))
    }

    #[actix_rt::test]
    async fn test_create_requires_admin() {
        let db = setup().await;
        let app = spawn_app!(db);

        let req = test::TestRequest::post()
            .uri("/api/v1/packages")
            .insert_header(("x-user-id", Uuid::new_v4().to_string()))
            .set_json(serde_json::json!({
                "name": "Pro",
                "price": 299_000,
                "duration_days": 30,
                "room_limit": 50,
                "kind": "paid"
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 403);
    }

    #[actix_rt::test]
    async fn test_create_validates_and_lists_active_only() {
        let db = setup().await;
        let app = spawn_app!(db);

        let req = admin_headers(test::TestRequest::post().uri("/api/v1/packages"))
            .set_json(serde_json::json!({
                "name": "P",
                "price": 299_000,
                "duration_days": 30,
                "room_limit": 50,
                "kind": "paid"
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 400);

        let req = admin_headers(test::TestRequest::post().uri("/api/v1/packages"))
            .set_json(serde_json::json!({
                "name": "Pro",
                "price": 299_000,
                "duration_days": 30,
                "room_limit": 50,
                "kind": "paid"
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 201);

        let req = admin_headers(test::TestRequest::post().uri("/api/v1/packages"))
            .set_json(serde_json::json!({
                "name": "Retired",
                "price": 99_000,
                "duration_days": 30,
                "room_limit": 10,
                "kind": "paid",
                "is_active": false
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 201);

        let req = test::TestRequest::get()
            .uri("/api/v1/packages")
            .insert_header(("x-user-id", Uuid::new_v4().to_string()))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["name"], "Pro");

        let req = admin_headers(test::TestRequest::get().uri("/api/v1/packages?all=true"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[actix_rt::test]
    async fn test_update_pins_trial_price() {
        let db = setup().await;
        let app = spawn_app!(db);

        let req = admin_headers(test::TestRequest::post().uri("/api/v1/packages"))
            .set_json(serde_json::json!({
                "name": "Free Trial",
                "price": 0,
                "duration_days": 14,
                "room_limit": 5,
                "kind": "trial"
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let req = admin_headers(test::TestRequest::put().uri(&format!("/api/v1/packages/{}", id)))
            .set_json(serde_json::json!({ "price": 120_000 }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["price"], 0);
    }
}
