//! Authenticated session and the background event loop.

mod client;
pub(crate) mod poll;

pub use client::{Mega, SessionStatus};
