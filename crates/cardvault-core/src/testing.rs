//! In-memory capability doubles for tests and smoke runs.
//!
//! [`MockCrypto`] is deterministic and NOT cryptographically secure; it only
//! mimics the shape of a real implementation (fixed lengths, authenticated
//! decryption) so the store engine can be exercised without slow key
//! derivation. [`MemoryFileIo`] keeps the container, its temp file and the
//! open handles in memory. Both are cheap to clone; clones share state so a
//! test can hand one copy to the engine and inspect the other. Failures are
//! injected per operation.

use std::{
    collections::HashSet,
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use zeroize::{Zeroize, Zeroizing};

use crate::capability::{
    CommitError, Crypto, CryptoError, FileIo, FileIoError, FileSlot, Sealed, SecretBytes,
};

/// Operations of [`MockCrypto`] that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptoFault {
    HashPassword,
    DeriveKey,
    Encrypt,
    Decrypt,
    /// Derivation succeeds but yields a key one byte shorter than `key_len`.
    ShortKey,
}

/// Capability-reported sizes used by [`MockCrypto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockLengths {
    pub hash: usize,
    pub salt: usize,
    pub key: usize,
    pub header: usize,
    pub tag: usize,
}

impl Default for MockLengths {
    fn default() -> Self {
        Self {
            hash: 32,
            salt: 16,
            key: 32,
            header: 24,
            tag: 16,
        }
    }
}

#[derive(Debug, Default)]
struct CryptoState {
    faults: Mutex<HashSet<CryptoFault>>,
    counter: AtomicU64,
    derive_calls: AtomicU64,
    hash_calls: AtomicU64,
    zero_calls: AtomicU64,
}

/// Deterministic stand-in for a real crypto capability.
#[derive(Debug, Clone, Default)]
pub struct MockCrypto {
    lengths: MockLengths,
    state: Arc<CryptoState>,
}

impl MockCrypto {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lengths(lengths: MockLengths) -> Self {
        Self {
            lengths,
            state: Arc::default(),
        }
    }

    pub fn inject(&self, fault: CryptoFault) {
        lock(&self.state.faults).insert(fault);
    }

    pub fn clear_faults(&self) {
        lock(&self.state.faults).clear();
    }

    pub fn derive_calls(&self) -> u64 {
        self.state.derive_calls.load(Ordering::Relaxed)
    }

    pub fn hash_calls(&self) -> u64 {
        self.state.hash_calls.load(Ordering::Relaxed)
    }

    pub fn zero_calls(&self) -> u64 {
        self.state.zero_calls.load(Ordering::Relaxed)
    }

    fn faulted(&self, fault: CryptoFault) -> bool {
        lock(&self.state.faults).contains(&fault)
    }

    fn next_counter(&self) -> [u8; 8] {
        self.state
            .counter
            .fetch_add(1, Ordering::Relaxed)
            .to_le_bytes()
    }

    fn tag(&self, key: &[u8], header: &[u8], body: &[u8]) -> Vec<u8> {
        expand(&[b"tag", key, header, body], self.lengths.tag)
    }
}

impl Crypto for MockCrypto {
    fn hash_len(&self) -> usize {
        self.lengths.hash
    }

    fn salt_len(&self) -> usize {
        self.lengths.salt
    }

    fn key_len(&self) -> usize {
        self.lengths.key
    }

    fn header_len(&self) -> usize {
        self.lengths.header
    }

    fn added_bytes(&self) -> usize {
        self.lengths.tag
    }

    fn hash_password(&self, password: &[u8]) -> Result<SecretBytes, CryptoError> {
        self.state.hash_calls.fetch_add(1, Ordering::Relaxed);
        if self.faulted(CryptoFault::HashPassword) {
            return Err(CryptoError::Hash {
                reason: "injected failure".to_string(),
            });
        }
        if password.is_empty() {
            return Err(CryptoError::Hash {
                reason: "empty password".to_string(),
            });
        }
        Ok(Zeroizing::new(expand(&[b"hash", password], self.lengths.hash)))
    }

    fn verify_password_hash(&self, hash: &[u8], password: &[u8]) -> bool {
        !password.is_empty() && expand(&[b"hash", password], self.lengths.hash) == hash
    }

    fn generate_salt(&self) -> Vec<u8> {
        expand(&[b"salt", &self.next_counter()], self.lengths.salt)
    }

    fn derive_key(&self, password: &[u8], salt: &[u8]) -> Result<SecretBytes, CryptoError> {
        self.state.derive_calls.fetch_add(1, Ordering::Relaxed);
        if self.faulted(CryptoFault::DeriveKey) {
            return Err(CryptoError::KeyDerivation {
                reason: "injected failure".to_string(),
            });
        }
        if password.is_empty() {
            return Err(CryptoError::KeyDerivation {
                reason: "empty password".to_string(),
            });
        }
        let mut len = self.lengths.key;
        if self.faulted(CryptoFault::ShortKey) {
            len = len.saturating_sub(1);
        }
        Ok(Zeroizing::new(expand(&[b"key", password, salt], len)))
    }

    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Sealed, CryptoError> {
        if self.faulted(CryptoFault::Encrypt) {
            return Err(CryptoError::Encrypt {
                reason: "injected failure".to_string(),
            });
        }
        let header = expand(&[b"nonce", &self.next_counter()], self.lengths.header);
        let stream = expand(&[b"stream", key, &header], plaintext.len());
        let mut ciphertext: Vec<u8> = plaintext.iter().zip(&stream).map(|(p, s)| p ^ s).collect();
        let tag = self.tag(key, &header, &ciphertext);
        ciphertext.extend_from_slice(&tag);
        Ok(Sealed { header, ciphertext })
    }

    fn decrypt(
        &self,
        header: &[u8],
        ciphertext: &[u8],
        key: &[u8],
    ) -> Result<SecretBytes, CryptoError> {
        if self.faulted(CryptoFault::Decrypt) || ciphertext.len() < self.lengths.tag {
            return Err(CryptoError::Decrypt);
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - self.lengths.tag);
        if self.tag(key, header, body) != tag {
            return Err(CryptoError::Decrypt);
        }
        let stream = expand(&[b"stream", key, header], body.len());
        Ok(Zeroizing::new(
            body.iter().zip(&stream).map(|(c, s)| c ^ s).collect(),
        ))
    }

    fn secure_zero(&self, buf: &mut [u8]) {
        self.state.zero_calls.fetch_add(1, Ordering::Relaxed);
        buf.zeroize();
    }
}

/// FNV-1a based expander; deterministic filler, not a real PRF.
fn expand(parts: &[&[u8]], len: usize) -> Vec<u8> {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    // Length-prefix each part so ("ab", "c") and ("a", "bc") differ.
    let mut framed = Vec::new();
    for part in parts {
        framed.extend_from_slice(&(part.len() as u64).to_le_bytes());
        framed.extend_from_slice(part);
    }

    let mut out = Vec::with_capacity(len + 8);
    let mut block: u64 = 0;
    while out.len() < len {
        let mut h = OFFSET;
        for byte in block.to_le_bytes().iter().chain(&framed) {
            h ^= u64::from(*byte);
            h = h.wrapping_mul(PRIME);
        }
        out.extend_from_slice(&h.to_le_bytes());
        block += 1;
    }
    out.truncate(len);
    out
}

/// Operations of [`MemoryFileIo`] that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFault {
    OpenRead,
    OpenWriteTemp,
    Read,
    /// Reads starting at or past this offset fail.
    ReadFrom(usize),
    WriteTemp,
    /// Writes fail once the temp file already holds data.
    WriteBody,
    Commit,
    /// Both position queries report one byte past the real offset.
    SkewPosition,
}

#[derive(Debug, Default)]
struct MemoryFs {
    main: Option<Vec<u8>>,
    temp: Option<Vec<u8>>,
    read_cursor: Option<usize>,
    write_open: bool,
    faults: HashSet<FileFault>,
    write_calls: usize,
    commit_calls: usize,
}

/// In-memory two-file store implementing [`FileIo`].
#[derive(Debug, Clone, Default)]
pub struct MemoryFileIo {
    inner: Arc<Mutex<MemoryFs>>,
}

impl MemoryFileIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, fault: FileFault) {
        self.fs().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.fs().faults.clear();
    }

    /// Committed container bytes, if any.
    pub fn main_bytes(&self) -> Option<Vec<u8>> {
        self.fs().main.clone()
    }

    pub fn set_main_bytes(&self, bytes: Option<Vec<u8>>) {
        self.fs().main = bytes;
    }

    pub fn temp_bytes(&self) -> Option<Vec<u8>> {
        self.fs().temp.clone()
    }

    /// Number of `write_temp` calls so far.
    pub fn write_calls(&self) -> usize {
        self.fs().write_calls
    }

    pub fn commit_calls(&self) -> usize {
        self.fs().commit_calls
    }

    /// `(read_open, write_open)`.
    pub fn open_handles(&self) -> (bool, bool) {
        let fs = self.fs();
        (fs.read_cursor.is_some(), fs.write_open)
    }

    fn fs(&self) -> MutexGuard<'_, MemoryFs> {
        lock(&self.inner)
    }
}

fn injected(op: &'static str, slot: FileSlot) -> FileIoError {
    FileIoError::io(op, slot, io::Error::other("injected failure"))
}

fn missing(op: &'static str, slot: FileSlot) -> FileIoError {
    FileIoError::io(op, slot, io::Error::from(io::ErrorKind::NotFound))
}

impl FileIo for MemoryFileIo {
    fn open_read(&mut self) -> Result<(), FileIoError> {
        let mut fs = self.fs();
        if fs.faults.contains(&FileFault::OpenRead) {
            return Err(injected("open", FileSlot::Main));
        }
        if fs.main.is_none() {
            return Err(missing("open", FileSlot::Main));
        }
        fs.read_cursor = Some(0);
        Ok(())
    }

    fn open_write_temp(&mut self) -> Result<(), FileIoError> {
        let mut fs = self.fs();
        if fs.faults.contains(&FileFault::OpenWriteTemp) {
            return Err(injected("open", FileSlot::Temp));
        }
        fs.temp = Some(Vec::new());
        fs.write_open = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), FileIoError> {
        let mut fs = self.fs();
        if fs.faults.contains(&FileFault::Read) {
            return Err(injected("read", FileSlot::Main));
        }
        let cursor = fs.read_cursor.ok_or(FileIoError::NotOpen {
            slot: FileSlot::Main,
        })?;
        let read_from = fs.faults.iter().find_map(|fault| match fault {
            FileFault::ReadFrom(offset) => Some(*offset),
            _ => None,
        });
        if read_from.is_some_and(|offset| cursor >= offset) {
            return Err(injected("read", FileSlot::Main));
        }
        let data = fs.main.as_deref().unwrap_or_default();
        let end = cursor + buf.len();
        if end > data.len() {
            return Err(FileIoError::io(
                "read",
                FileSlot::Main,
                io::Error::from(io::ErrorKind::UnexpectedEof),
            ));
        }
        buf.copy_from_slice(&data[cursor..end]);
        fs.read_cursor = Some(end);
        Ok(())
    }

    fn write_temp(&mut self, buf: &[u8]) -> Result<(), FileIoError> {
        let mut fs = self.fs();
        fs.write_calls += 1;
        if !fs.write_open {
            return Err(FileIoError::NotOpen {
                slot: FileSlot::Temp,
            });
        }
        let non_empty = fs.temp.as_ref().is_some_and(|t| !t.is_empty());
        if fs.faults.contains(&FileFault::WriteTemp)
            || (non_empty && fs.faults.contains(&FileFault::WriteBody))
        {
            return Err(injected("write", FileSlot::Temp));
        }
        fs.temp.get_or_insert_with(Vec::new).extend_from_slice(buf);
        Ok(())
    }

    fn close_read(&mut self) {
        self.fs().read_cursor = None;
    }

    fn close_write_temp(&mut self) -> Result<(), FileIoError> {
        self.fs().write_open = false;
        Ok(())
    }

    fn position_read(&mut self) -> Result<u64, FileIoError> {
        let fs = self.fs();
        let cursor = fs.read_cursor.ok_or(FileIoError::NotOpen {
            slot: FileSlot::Main,
        })?;
        let skew = u64::from(fs.faults.contains(&FileFault::SkewPosition));
        Ok(cursor as u64 + skew)
    }

    fn position_write_temp(&mut self) -> Result<u64, FileIoError> {
        let fs = self.fs();
        if !fs.write_open {
            return Err(FileIoError::NotOpen {
                slot: FileSlot::Temp,
            });
        }
        let skew = u64::from(fs.faults.contains(&FileFault::SkewPosition));
        Ok(fs.temp.as_ref().map_or(0, Vec::len) as u64 + skew)
    }

    fn size(&self, slot: FileSlot) -> Result<u64, FileIoError> {
        let fs = self.fs();
        let file = match slot {
            FileSlot::Main => fs.main.as_ref(),
            FileSlot::Temp => fs.temp.as_ref(),
        };
        file.map(|bytes| bytes.len() as u64)
            .ok_or_else(|| missing("stat", slot))
    }

    fn exists(&self, slot: FileSlot) -> bool {
        let fs = self.fs();
        match slot {
            FileSlot::Main => fs.main.is_some(),
            FileSlot::Temp => fs.temp.is_some(),
        }
    }

    fn delete(&mut self, slot: FileSlot) -> Result<(), FileIoError> {
        let mut fs = self.fs();
        let removed = match slot {
            FileSlot::Main => fs.main.take(),
            FileSlot::Temp => fs.temp.take(),
        };
        removed.map(|_| ()).ok_or_else(|| missing("delete", slot))
    }

    fn commit_temp(&mut self) -> Result<(), CommitError> {
        let mut fs = self.fs();
        fs.commit_calls += 1;
        let had_main = fs.main.is_some();
        if fs.faults.contains(&FileFault::Commit) {
            fs.temp = None;
            let source = io::Error::other("injected failure");
            return Err(if had_main {
                CommitError::SwapTemp {
                    restored: true,
                    source,
                }
            } else {
                CommitError::PromoteTemp { source }
            });
        }
        match fs.temp.take() {
            Some(bytes) => {
                fs.main = Some(bytes);
                Ok(())
            }
            None => Err(CommitError::PromoteTemp {
                source: io::Error::from(io::ErrorKind::NotFound),
            }),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_crypto_round_trips_and_detects_tamper() {
        let crypto = MockCrypto::new();
        let key = crypto.derive_key(b"pw", b"salt").expect("derive");
        let sealed = crypto.encrypt(b"payload", &key).expect("encrypt");

        assert_eq!(sealed.header.len(), crypto.header_len());
        assert_eq!(sealed.ciphertext.len(), 7 + crypto.added_bytes());
        assert_ne!(&sealed.ciphertext[..7], b"payload");

        let plain = crypto
            .decrypt(&sealed.header, &sealed.ciphertext, &key)
            .expect("decrypt");
        assert_eq!(plain.as_slice(), b"payload");

        let mut tampered = sealed.ciphertext.clone();
        tampered[0] ^= 1;
        assert_eq!(
            crypto.decrypt(&sealed.header, &tampered, &key),
            Err(CryptoError::Decrypt)
        );

        let other = crypto.derive_key(b"pw2", b"salt").expect("derive");
        assert_eq!(
            crypto.decrypt(&sealed.header, &sealed.ciphertext, &other),
            Err(CryptoError::Decrypt)
        );
    }

    #[test]
    fn mock_crypto_verifies_only_matching_password() {
        let crypto = MockCrypto::new();
        let hash = crypto.hash_password(b"correct horse").expect("hash");
        assert!(crypto.verify_password_hash(&hash, b"correct horse"));
        assert!(!crypto.verify_password_hash(&hash, b"wrong horse"));
        assert_ne!(crypto.generate_salt(), crypto.generate_salt());
    }

    #[test]
    fn memory_file_commit_replaces_main() {
        let mut files = MemoryFileIo::new();
        files.open_write_temp().expect("open");
        files.write_temp(b"abc").expect("write");
        assert_eq!(files.position_write_temp().expect("pos"), 3);
        files.close_write_temp().expect("close");
        assert!(!files.exists(FileSlot::Main));

        files.commit_temp().expect("commit");
        assert_eq!(files.main_bytes().as_deref(), Some(&b"abc"[..]));
        assert!(!files.exists(FileSlot::Temp));

        files.open_read().expect("open read");
        let mut buf = [0u8; 4];
        let err = files.read(&mut buf).expect_err("short read");
        assert!(matches!(err, FileIoError::Io { op: "read", .. }));
    }

    #[test]
    fn memory_file_injected_commit_failure_keeps_main() {
        let mut files = MemoryFileIo::new();
        files.set_main_bytes(Some(b"old".to_vec()));
        files.inject(FileFault::Commit);
        files.open_write_temp().expect("open");
        files.write_temp(b"new").expect("write");
        files.close_write_temp().expect("close");

        let err = files.commit_temp().expect_err("commit should fail");
        assert!(matches!(err, CommitError::SwapTemp { restored: true, .. }));
        assert_eq!(files.main_bytes().as_deref(), Some(&b"old"[..]));
        assert!(files.temp_bytes().is_none());
    }
}
