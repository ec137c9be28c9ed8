//! API layer for the seal service
//!
//! JSON over HTTP, nested under `/api` by [`crate::server`].

pub mod error;
mod rest;
pub mod types;

pub use error::{ApiError, ErrorCode};
pub use rest::*;
