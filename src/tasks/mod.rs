pub mod expiry_task;
