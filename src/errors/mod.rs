//! Error types for the HTTP surface.
//!
//! Domain errors live next to their modules (`ProtocolError`,
//! `DecodeError`, `ProviderError`, `RegistryError`); this module holds the
//! errors that map directly to HTTP responses.

pub mod auth_error;

pub use auth_error::{AuthError, AuthResult};
