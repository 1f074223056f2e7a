//! Encrypted card store engine.
//!
//! [`Store`] keeps the record set in memory and persists it as a single
//! container, `[password_hash][salt][encryption_header][encrypted_body]`, through
//! the [`Crypto`](cardvault_core::capability::Crypto) and
//! [`FileIo`](cardvault_core::capability::FileIo) capabilities. Writes always go
//! through a temp file and an atomic commit, so a failed init or save leaves the
//! previously committed container (or none) in place.

mod error;
mod session;
mod store;

pub use error::{DataReadError, HeaderError, InitError, LoadError, SaveError};
pub use store::Store;
