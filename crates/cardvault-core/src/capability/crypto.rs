use thiserror::Error;
use zeroize::Zeroizing;

/// Owned secret buffer that is wiped when dropped.
pub type SecretBytes = Zeroizing<Vec<u8>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("password hashing failed: {reason}")]
    Hash { reason: String },
    #[error("key derivation failed: {reason}")]
    KeyDerivation { reason: String },
    #[error("encryption failed: {reason}")]
    Encrypt { reason: String },
    /// Authentication tag mismatch: tampered data or the wrong key.
    #[error("decryption failed")]
    Decrypt,
}

/// Output of one AEAD seal: a fixed-length header (nonce) and the ciphertext with its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub header: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Password hashing, key derivation and authenticated encryption.
///
/// Implementations hold no state between calls beyond their fixed parameters.
/// All lengths are reported by the implementation so the container layout
/// follows whatever sizes the capability uses.
pub trait Crypto {
    /// Length of the blob returned by [`Crypto::hash_password`].
    fn hash_len(&self) -> usize;
    fn salt_len(&self) -> usize;
    fn key_len(&self) -> usize;
    /// Length of [`Sealed::header`].
    fn header_len(&self) -> usize;
    /// Bytes an encrypted message grows by (the authentication tag).
    fn added_bytes(&self) -> usize;

    fn hash_password(&self, password: &[u8]) -> Result<SecretBytes, CryptoError>;

    /// `true` only when `password` matches `hash`; malformed hashes verify as `false`.
    fn verify_password_hash(&self, hash: &[u8], password: &[u8]) -> bool;

    fn generate_salt(&self) -> Vec<u8>;

    fn derive_key(&self, password: &[u8], salt: &[u8]) -> Result<SecretBytes, CryptoError>;

    /// Derive the container key with the cost recorded in `password_hash`, so
    /// a container keeps opening after the configured cost changes.
    /// Implementations whose cost is fixed can rely on the default.
    fn derive_key_for_hash(
        &self,
        password: &[u8],
        salt: &[u8],
        password_hash: &[u8],
    ) -> Result<SecretBytes, CryptoError> {
        let _ = password_hash;
        self.derive_key(password, salt)
    }

    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Sealed, CryptoError>;

    fn decrypt(
        &self,
        header: &[u8],
        ciphertext: &[u8],
        key: &[u8],
    ) -> Result<SecretBytes, CryptoError>;

    fn secure_zero(&self, buf: &mut [u8]);
}
