use actix_web::{web, HttpResponse};

use crate::models::common::ApiResponse;
use crate::services::database::DatabaseService;

pub async fn health_check(db: web::Data<DatabaseService>) -> HttpResponse {
    match db.health_check().await {
        Ok(()) => HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
            "status": "healthy",
            "database": "connected"
        }))),
        Err(err) => {
            log::error!("health check failed: {:#}", err);
            HttpResponse::ServiceUnavailable().json(ApiResponse::<()>::error(
                "database unavailable".to_string(),
            ))
        }
    }
}
