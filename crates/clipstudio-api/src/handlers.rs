//! HTTP handlers.

pub mod health;
pub mod internal;
pub mod jobs;

pub use health::{health, ready};
