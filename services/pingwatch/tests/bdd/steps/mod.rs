//! BDD step definitions for pingwatch service

pub mod lifecycle_steps;
pub mod notification_steps;
