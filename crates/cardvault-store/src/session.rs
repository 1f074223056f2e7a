use std::fmt;

use cardvault_core::capability::{Crypto, SecretBytes};
use zeroize::Zeroizing;

use crate::error::HeaderError;

/// Secrets held between a successful init/load and the end of the session.
///
/// The hash and salt are written back unchanged on every save, and the key
/// lets saves re-encrypt without asking for the password again.
pub(crate) struct Session {
    pub(crate) hash: SecretBytes,
    pub(crate) salt: SecretBytes,
    pub(crate) key: SecretBytes,
}

impl Session {
    /// The `[hash][salt]` prefix of the container.
    pub(crate) fn header_bytes(
        &self,
        hash_len: usize,
        salt_len: usize,
    ) -> Result<SecretBytes, HeaderError> {
        expect_len("password hash", hash_len, self.hash.len())?;
        expect_len("salt", salt_len, self.salt.len())?;

        let mut out = Zeroizing::new(Vec::with_capacity(hash_len + salt_len));
        out.extend_from_slice(&self.hash);
        out.extend_from_slice(&self.salt);
        Ok(out)
    }

    /// Wipe through the capability. The buffers also zero themselves on drop.
    pub(crate) fn wipe<C: Crypto>(&mut self, crypto: &C) {
        crypto.secure_zero(&mut self.hash);
        crypto.secure_zero(&mut self.salt);
        crypto.secure_zero(&mut self.key);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("hash", &"<redacted>")
            .field("salt", &"<redacted>")
            .field("key", &"<redacted>")
            .finish()
    }
}

fn expect_len(what: &'static str, expected: usize, actual: usize) -> Result<(), HeaderError> {
    if expected != actual {
        return Err(HeaderError::Length {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
