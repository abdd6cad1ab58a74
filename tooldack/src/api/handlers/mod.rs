//! Axum route handlers.
//!
//! - [`system`]: health check, connection check page and retired endpoints
//! - [`tools`]: the multipart image tools and store-and-link upload

pub mod system;
pub mod tools;
