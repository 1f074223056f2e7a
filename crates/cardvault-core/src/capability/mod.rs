//! Contracts for the external services the store engine consumes: password
//! hashing and authenticated encryption ([`Crypto`]), and the two-phase
//! read/commit file protocol ([`FileIo`]).

pub mod crypto;
pub mod file_io;

pub use crypto::{Crypto, CryptoError, Sealed, SecretBytes};
pub use file_io::{CommitError, FileIo, FileIoError, FileSlot};
