//! lanyard-core - client-side session management for portal-federated
//! applications.
//!
//! A central portal authenticates end users and hands satellite
//! applications a signed bearer token over a redirect. This crate is the
//! token's entire client-side lifecycle: fingerprint-bound storage,
//! stateless decode and expiry checks, a CSRF-protected login handshake,
//! and a heartbeat that reconciles local state with server authority to
//! catch revocation, deletion, and forced logout.
//!
//! The crate renders nothing. Embedders construct an [`AuthConfig`], hand a
//! [`Navigator`] implementation to [`SessionManager`], and observe
//! [`AuthState`] snapshots through a watch channel.

pub mod api;
pub mod config;
pub mod fingerprint;
pub mod models;
pub mod session;
pub mod storage;
pub mod token;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{ApiError, PortalClient, TokenExchanger, TokenGrant};
pub use config::{AuthConfig, ConfigError};
pub use fingerprint::DeviceEnv;
pub use models::{AuthUser, SubscriptionPlan, SubscriptionStatus, TokenClaims, UserRole};
pub use session::{
    AuthState, CallbackError, CallbackParams, Navigator, RejectReason, SessionManager,
    SessionValidation, SessionValidator,
};
pub use storage::{AuthStorage, StorageArea};
pub use token::{BoundTokenStore, CsrfStateStore, DecodeError};
