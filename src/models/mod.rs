pub mod common;
pub mod package;
pub mod property;
pub mod subscription;
