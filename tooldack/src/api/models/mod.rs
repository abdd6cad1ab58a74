//! API request and response data models.
//!
//! Tool routes answer with raw image or PDF bytes, so only a few JSON shapes exist:
//!
//! - [`uploads`]: the store-and-link result
//! - [`system`]: health reporting
//!
//! Failures on every route use [`crate::errors::ErrorResponse`].

pub mod system;
pub mod uploads;
