//! HTTP surface towards the portal's token service.
//!
//! The only consumed endpoint is `exchange-token`, which validates the
//! current bearer token and may hand back a refreshed one.

pub mod client;
pub mod error;

pub use client::{PortalClient, TokenExchanger, TokenGrant};
pub use error::ApiError;
