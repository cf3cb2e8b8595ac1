//! Bearer-token lifecycle: decoding, fingerprint-bound persistence, and the
//! one-shot CSRF state for the login redirect.

pub mod codec;
pub mod csrf;
pub mod store;

pub use codec::DecodeError;
pub use csrf::CsrfStateStore;
pub use store::BoundTokenStore;
