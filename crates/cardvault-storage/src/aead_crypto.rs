use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use cardvault_core::capability::{Crypto, CryptoError, Sealed, SecretBytes};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Fixed width of the stored password hash: the PHC string, NUL-padded.
pub const HASH_LEN: usize = 128;
pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
/// AES-GCM nonce.
pub const HEADER_LEN: usize = 12;
/// AES-GCM tag.
pub const ADDED_BYTES: usize = 16;

const HASH_SALT_LEN: usize = 16;
const MAX_PASSWORD_BYTES: usize = 4096;

/// Argon2id cost parameters shared by password hashing and key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid argon2 parameters: {reason}")]
pub struct KdfParamsError {
    reason: String,
}

impl KdfParams {
    /// 64 MiB, 3 passes, 1 lane.
    pub const fn interactive() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }

    /// Cheapest accepted setting. Only for tests.
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    pub fn validate(&self) -> Result<(), KdfParamsError> {
        self.to_argon2_params().map(|_| ())
    }

    fn to_argon2_params(self) -> Result<Params, KdfParamsError> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| KdfParamsError {
            reason: e.to_string(),
        })
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Argon2id + AES-256-GCM implementation of the crypto capability.
///
/// The configured [`KdfParams`] apply to new password hashes. Keys for an
/// existing container are derived with the cost recorded in its stored hash.
#[derive(Clone)]
pub struct AeadCrypto {
    params: KdfParams,
    argon2: Argon2<'static>,
}

impl AeadCrypto {
    pub fn new(params: KdfParams) -> Result<Self, KdfParamsError> {
        let argon2_params = params.to_argon2_params()?;
        Ok(Self {
            params,
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params),
        })
    }
}

fn check_password_len(password: &[u8]) -> Result<(), String> {
    if password.is_empty() || password.len() > MAX_PASSWORD_BYTES {
        return Err(format!(
            "password must be 1-{MAX_PASSWORD_BYTES} bytes, got {}",
            password.len()
        ));
    }
    Ok(())
}

/// PHC string of a NUL-padded stored hash.
fn parse_stored_hash(hash: &[u8]) -> Result<PasswordHash<'_>, String> {
    let end = hash.iter().position(|&b| b == 0).unwrap_or(hash.len());
    let encoded =
        std::str::from_utf8(&hash[..end]).map_err(|_| "stored hash is not utf-8".to_string())?;
    PasswordHash::new(encoded).map_err(|e| format!("stored hash is not a PHC string: {e}"))
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm, String> {
    Aes256Gcm::new_from_slice(key).map_err(|e| format!("cipher init failed: {e}"))
}

impl Crypto for AeadCrypto {
    fn hash_len(&self) -> usize {
        HASH_LEN
    }

    fn salt_len(&self) -> usize {
        SALT_LEN
    }

    fn key_len(&self) -> usize {
        KEY_LEN
    }

    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn added_bytes(&self) -> usize {
        ADDED_BYTES
    }

    fn hash_password(&self, password: &[u8]) -> Result<SecretBytes, CryptoError> {
        check_password_len(password).map_err(|reason| CryptoError::Hash { reason })?;

        let mut salt_bytes = [0u8; HASH_SALT_LEN];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| CryptoError::Hash {
            reason: e.to_string(),
        })?;

        let phc = Zeroizing::new(
            self.argon2
                .hash_password(password, &salt)
                .map_err(|e| CryptoError::Hash {
                    reason: e.to_string(),
                })?
                .to_string(),
        );
        if phc.len() > HASH_LEN {
            return Err(CryptoError::Hash {
                reason: format!("encoded hash is {} bytes, limit {HASH_LEN}", phc.len()),
            });
        }

        let mut out = Zeroizing::new(vec![0u8; HASH_LEN]);
        out[..phc.len()].copy_from_slice(phc.as_bytes());
        Ok(out)
    }

    fn verify_password_hash(&self, hash: &[u8], password: &[u8]) -> bool {
        if check_password_len(password).is_err() {
            return false;
        }
        let parsed = match parse_stored_hash(hash) {
            Ok(parsed) => parsed,
            Err(reason) => {
                debug!(%reason, "stored password hash unusable");
                return false;
            }
        };
        // Verification uses the parameters recorded in the hash itself.
        self.argon2.verify_password(password, &parsed).is_ok()
    }

    fn generate_salt(&self) -> Vec<u8> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    fn derive_key(&self, password: &[u8], salt: &[u8]) -> Result<SecretBytes, CryptoError> {
        check_password_len(password).map_err(|reason| CryptoError::KeyDerivation { reason })?;

        let mut key = Zeroizing::new(vec![0u8; KEY_LEN]);
        self.argon2
            .hash_password_into(password, salt, &mut key)
            .map_err(|e| CryptoError::KeyDerivation {
                reason: e.to_string(),
            })?;
        Ok(key)
    }

    fn derive_key_for_hash(
        &self,
        password: &[u8],
        salt: &[u8],
        password_hash: &[u8],
    ) -> Result<SecretBytes, CryptoError> {
        let to_error = |reason: String| CryptoError::KeyDerivation { reason };
        let parsed = parse_stored_hash(password_hash).map_err(to_error)?;
        let stored = Params::try_from(&parsed).map_err(|e| to_error(e.to_string()))?;
        let params = KdfParams {
            memory_kib: stored.m_cost(),
            iterations: stored.t_cost(),
            parallelism: stored.p_cost(),
        };
        if params != self.params {
            debug!(?params, "deriving with the cost recorded in the container");
        }
        AeadCrypto::new(params)
            .map_err(|e| to_error(e.to_string()))?
            .derive_key(password, salt)
    }

    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Sealed, CryptoError> {
        let cipher = build_cipher(key).map_err(|reason| CryptoError::Encrypt { reason })?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::Encrypt {
                reason: e.to_string(),
            })?;
        Ok(Sealed {
            header: nonce.to_vec(),
            ciphertext,
        })
    }

    fn decrypt(
        &self,
        header: &[u8],
        ciphertext: &[u8],
        key: &[u8],
    ) -> Result<SecretBytes, CryptoError> {
        if header.len() != HEADER_LEN {
            return Err(CryptoError::Decrypt);
        }
        let cipher = build_cipher(key).map_err(|_| CryptoError::Decrypt)?;
        cipher
            .decrypt(Nonce::from_slice(header), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Decrypt)
    }

    fn secure_zero(&self, buf: &mut [u8]) {
        buf.zeroize();
    }
}
