pub mod database;
pub mod mailer;
pub mod subscription;
pub mod vnpay;
