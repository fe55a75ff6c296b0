use actix_web::{web, HttpRequest, HttpResponse};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::handlers::auth::AuthContext;
use crate::models::common::{ApiResponse, PaginationQuery};
use crate::models::subscription::{HistoryQuery, PurchaseRequest, SubscriptionStatus};
use crate::services::subscription::SubscriptionService;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/subscriptions")
            .route("/trial", web::post().to(start_trial))
            .route("/purchase", web::post().to(purchase))
            .route("/renew", web::post().to(renew))
            .route("/vnpay/callback", web::get().to(vnpay_callback))
            .route("/current", web::get().to(current_stats))
            .route("/entitlement", web::get().to(entitlement))
            .route("", web::get().to(history))
            .route("/{id}/cancel", web::post().to(cancel))
            .route("/{id}", web::get().to(detail)),
    );
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("127.0.0.1")
        .to_string()
}

async fn start_trial(
    auth: AuthContext,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, ApiError> {
    let subscription = service.start_trial(auth.user_id).await?;
    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        subscription,
        "trial activated".to_string(),
    )))
}

async fn purchase(
    auth: AuthContext,
    service: web::Data<SubscriptionService>,
    body: web::Json<PurchaseRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let checkout = service
        .buy_package(auth.user_id, body.package_id, &client_ip(&req))
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(checkout)))
}

async fn renew(
    auth: AuthContext,
    service: web::Data<SubscriptionService>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let checkout = service
        .renew_package(auth.user_id, &client_ip(&req))
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(checkout)))
}

/// Return URL the gateway redirects the payer to. Unauthenticated: the
/// payload is trusted only as far as its signature verifies.
async fn vnpay_callback(
    service: web::Data<SubscriptionService>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse, ApiError> {
    let subscription = service.payment_callback(&query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        subscription,
        "payment confirmed".to_string(),
    )))
}

async fn cancel(
    auth: AuthContext,
    service: web::Data<SubscriptionService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let subscription = service
        .cancel_subscription(auth.user_id, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(subscription)))
}

async fn history(
    auth: AuthContext,
    service: web::Data<SubscriptionService>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            raw.parse::<SubscriptionStatus>()
                .map_err(ApiError::Validation)?,
        ),
        None => None,
    };
    let (page, limit) = PaginationQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve();
    let page = service
        .list_history(auth.user_id, status, page, limit)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
}

async fn current_stats(
    auth: AuthContext,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, ApiError> {
    let stats = service.current_stats(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

async fn detail(
    auth: AuthContext,
    service: web::Data<SubscriptionService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let subscription = service
        .subscription_detail(auth.user_id, auth.is_admin, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(subscription)))
}

async fn entitlement(
    auth: AuthContext,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, ApiError> {
    let entitled = service.has_active_subscription(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "entitled": entitled
    }))))
}
