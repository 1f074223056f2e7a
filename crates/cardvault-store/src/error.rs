use cardvault_core::{
    capability::{CommitError, CryptoError, FileIoError},
    codec::CodecError,
};
use thiserror::Error;

/// Problems with the fixed `[hash][salt]` region of the container.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("header region at offset {actual}, expected {expected}")]
    Misplaced { expected: u64, actual: u64 },
    #[error("capability produced a {actual}-byte {what}, expected {expected}")]
    Length {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Io(#[from] FileIoError),
}

/// Failure to create a new, empty container. No container is committed.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("hashing the password failed")]
    Hash(#[source] CryptoError),
    #[error("deriving the encryption key failed")]
    KeyDerivation(#[source] CryptoError),
    #[error("opening the temp file failed")]
    TempOpen(#[source] FileIoError),
    #[error("writing the container header failed")]
    HeaderWrite(#[source] HeaderError),
    #[error("committing the container failed")]
    Commit(#[source] CommitError),
}

/// The body could not be read back given the container's reported size.
#[derive(Debug, Error)]
pub enum DataReadError {
    #[error("querying container size failed")]
    Size(#[source] FileIoError),
    #[error("container is {size} bytes, at least {required} required")]
    TooShort { size: u64, required: u64 },
    #[error("container is {size} bytes, too large to load")]
    TooLarge { size: u64 },
    #[error("reading the encrypted body failed")]
    Read(#[source] FileIoError),
}

/// Distinct outcomes of opening an existing container.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The container could not be opened.
    #[error("opening the container failed")]
    Open(#[source] FileIoError),
    /// Truncated or malformed `[hash][salt]` region.
    #[error("reading the container header failed")]
    HeaderRead(#[source] HeaderError),
    /// Wrong password. Not a corruption signal.
    #[error("password does not match")]
    PasswordMismatch,
    #[error("deriving the encryption key failed")]
    KeyDerivation(#[source] CryptoError),
    #[error("reading the encrypted body failed")]
    DataRead(#[source] DataReadError),
    /// Authentication failed after the password matched: the body is corrupt
    /// or was tampered with.
    #[error("decrypting the body failed")]
    DataDecrypt(#[source] CryptoError),
    /// The body decrypted but does not hold a valid record set.
    #[error("decoding the record set failed")]
    DataDecode(#[source] CodecError),
}

/// Failure to persist the record set. The committed container is unchanged
/// unless the error is a [`SaveError::Commit`] whose source reports
/// [`CommitError::is_committed`].
#[derive(Debug, Error)]
pub enum SaveError {
    /// Nothing was initialised or loaded, so there is no key to save with.
    #[error("no open session")]
    NoSession,
    #[error("opening the temp file failed")]
    Open(#[source] FileIoError),
    #[error("writing the container header failed")]
    Header(#[source] HeaderError),
    #[error("encrypting the record set failed")]
    Encrypt(#[source] CryptoError),
    #[error("writing the encrypted body failed")]
    WriteData(#[source] FileIoError),
    #[error("committing the container failed")]
    Commit(#[source] CommitError),
}
