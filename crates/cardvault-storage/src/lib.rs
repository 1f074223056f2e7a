//! Concrete capability implementations: Argon2id password hashing and key
//! derivation with AES-256-GCM bodies, and a filesystem-backed two-phase file
//! protocol with rename-based atomic commit.

pub mod aead_crypto;
pub mod commit;
pub mod fs_file_io;
