//! HTTP layer: route handlers and their response models.
//!
//! - **[`handlers`]**: Axum handlers for everything under `/api`
//! - **[`models`]**: JSON bodies returned by those handlers
//!
//! Every tool route accepts `multipart/form-data` and either streams the transformed file back
//! or, for `/api/upload`, answers with an [`models::uploads::UploadResponse`]. Failures are
//! always a JSON `{"error": "..."}` body (see [`crate::errors`]).
//!
//! The OpenAPI document for these routes lives in [`crate::openapi`] and is rendered at
//! `/api/docs`.

pub mod handlers;
pub mod models;
