mod config;
mod errors;
mod handlers;
mod models;
mod services;
mod tasks;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::env;
use std::sync::Arc;

use services::{
    database::DatabaseService,
    mailer::{HttpMailer, LogMailer, Mailer},
    subscription::SubscriptionService,
    vnpay::VnpayService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = config::Config::from_env().expect("Failed to load configuration");

    let database_service = DatabaseService::new(&config.database_url)
        .await
        .expect("Failed to initialize database");

    let vnpay_service = VnpayService::new(config.vnpay.clone());

    let mailer: Arc<dyn Mailer> = match config.mail.relay_url.clone() {
        Some(relay_url) => Arc::new(HttpMailer::new(relay_url, &config.mail)),
        None => {
            log::warn!("MAIL_RELAY_URL not set, confirmation mails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let subscription_service = SubscriptionService::new(
        database_service.clone(),
        vnpay_service.clone(),
        mailer,
        config.app.clone(),
    );

    tasks::expiry_task::spawn_expiry_task(
        subscription_service.clone(),
        config.app.sweep_interval_secs,
    );

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    println!("🚀 Starting Rently Billing Server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header(),
            )
            .app_data(web::Data::new(database_service.clone()))
            .app_data(web::Data::new(subscription_service.clone()))
            .service(
                web::scope("/api/v1")
                    .configure(handlers::subscription::configure)
                    .configure(handlers::package::configure)
                    .route("/health", web::get().to(handlers::health::health_check)),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
