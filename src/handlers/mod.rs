pub mod auth;
pub mod health;
pub mod package;
pub mod subscription;
