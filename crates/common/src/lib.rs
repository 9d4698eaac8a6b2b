//! Shared types, configuration and error handling for chexmix-push.

pub mod clock;
pub mod config;
pub mod error;
pub mod redis_pool;
pub mod types;
