//! MEGA API client and types.

pub mod client;
pub mod error;
pub mod types;

pub use client::ApiClient;
pub use error::ErrorCode;
pub use types::*;
