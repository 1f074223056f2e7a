use cardvault_core::{
    capability::{
        CommitError, Crypto, CryptoError, FileIo, FileIoError, FileSlot, Sealed, SecretBytes,
    },
    card::{Card, CardError},
    codec,
};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::{
    error::{DataReadError, HeaderError, InitError, LoadError, SaveError},
    session::Session,
};

/// In-memory record set bound to one encrypted container.
///
/// The store is single-threaded and synchronous: every operation runs to
/// completion on the caller's thread. Secrets derived from the password live
/// only for the session and are wiped on [`Store::close`] or drop.
pub struct Store<C: Crypto, F: FileIo> {
    crypto: C,
    files: F,
    cards: Vec<Card>,
    session: Option<Session>,
    dirty: bool,
}

/// Where a container write stopped.
enum WriteFailure {
    Open(FileIoError),
    Header(HeaderError),
    Data(FileIoError),
    Commit(CommitError),
}

impl<C: Crypto, F: FileIo> Store<C, F> {
    pub fn new(crypto: C, files: F) -> Self {
        Self {
            crypto,
            files,
            cards: Vec::new(),
            session: None,
            dirty: false,
        }
    }

    /// Create an empty container protected by `password`, replacing any
    /// existing one only once the new container is fully written.
    ///
    /// On success the store holds an empty record set and an open session, so
    /// cards can be added and saved straight away.
    #[instrument(skip_all)]
    pub fn init_new_store(&mut self, password: &[u8]) -> Result<(), InitError> {
        let hash = self.crypto.hash_password(password).map_err(InitError::Hash)?;
        let salt = Zeroizing::new(self.crypto.generate_salt());
        let key = self
            .crypto
            .derive_key_for_hash(password, &salt, &hash)
            .and_then(|key| check_key(&self.crypto, key))
            .map_err(InitError::KeyDerivation)?;
        let session = Session { hash, salt, key };

        let header = session
            .header_bytes(self.crypto.hash_len(), self.crypto.salt_len())
            .map_err(InitError::HeaderWrite)?;
        if let Err(failure) = write_container(&mut self.files, &header, None) {
            let err = match failure {
                WriteFailure::Open(e) => InitError::TempOpen(e),
                WriteFailure::Header(e) => InitError::HeaderWrite(e),
                WriteFailure::Data(e) => InitError::HeaderWrite(HeaderError::Io(e)),
                WriteFailure::Commit(e) => {
                    if e.is_committed() {
                        self.start_session(session, Vec::new());
                    }
                    InitError::Commit(e)
                }
            };
            warn!(error = %err, "initialising container failed");
            return Err(err);
        }

        self.start_session(session, Vec::new());
        debug!("empty container initialised");
        Ok(())
    }

    /// Open the container with `password` and replace the in-memory record set
    /// with its contents.
    ///
    /// On any error the previous in-memory state is left untouched. The read
    /// handle is closed on every path.
    #[instrument(skip_all)]
    pub fn load_store(&mut self, password: &[u8]) -> Result<(), LoadError> {
        self.files.open_read().map_err(LoadError::Open)?;
        let loaded = self.read_container(password);
        self.files.close_read();

        match loaded {
            Ok((session, cards)) => {
                debug!(cards = cards.len(), "container loaded");
                self.start_session(session, cards);
                Ok(())
            }
            Err(LoadError::PasswordMismatch) => {
                debug!("password rejected");
                Err(LoadError::PasswordMismatch)
            }
            Err(err) => {
                warn!(error = %err, "loading container failed");
                Err(err)
            }
        }
    }

    fn read_container(&mut self, password: &[u8]) -> Result<(Session, Vec<Card>), LoadError> {
        let hash_len = self.crypto.hash_len();
        let salt_len = self.crypto.salt_len();
        let fixed = (hash_len + salt_len) as u64;

        let mut hash = Zeroizing::new(vec![0u8; hash_len]);
        let mut salt = Zeroizing::new(vec![0u8; salt_len]);
        self.read_header(&mut hash, &mut salt)
            .map_err(LoadError::HeaderRead)?;

        if !self.crypto.verify_password_hash(&hash, password) {
            return Err(LoadError::PasswordMismatch);
        }
        let key = self
            .crypto
            .derive_key_for_hash(password, &salt, &hash)
            .and_then(|key| check_key(&self.crypto, key))
            .map_err(LoadError::KeyDerivation)?;
        let session = Session { hash, salt, key };

        let size = self
            .files
            .size(FileSlot::Main)
            .map_err(|e| LoadError::DataRead(DataReadError::Size(e)))?;
        let body_len = size.checked_sub(fixed).ok_or(LoadError::DataRead(
            DataReadError::TooShort {
                size,
                required: fixed,
            },
        ))?;
        if body_len == 0 {
            return Ok((session, Vec::new()));
        }

        let enc_header_len = self.crypto.header_len();
        let min_body = (enc_header_len + self.crypto.added_bytes()) as u64;
        if body_len < min_body {
            return Err(LoadError::DataRead(DataReadError::TooShort {
                size,
                required: fixed + min_body,
            }));
        }
        let ciphertext_len = usize::try_from(body_len - enc_header_len as u64)
            .map_err(|_| LoadError::DataRead(DataReadError::TooLarge { size }))?;

        let mut enc_header = vec![0u8; enc_header_len];
        let mut ciphertext = vec![0u8; ciphertext_len];
        self.files
            .read(&mut enc_header)
            .and_then(|()| self.files.read(&mut ciphertext))
            .map_err(|e| LoadError::DataRead(DataReadError::Read(e)))?;

        let plaintext = self
            .crypto
            .decrypt(&enc_header, &ciphertext, &session.key)
            .map_err(LoadError::DataDecrypt)?;
        let cards = codec::decode_bytes(&plaintext).map_err(LoadError::DataDecode)?;
        Ok((session, cards))
    }

    fn read_header(&mut self, hash: &mut [u8], salt: &mut [u8]) -> Result<(), HeaderError> {
        expect_position(self.files.position_read(), 0)?;
        self.files.read(hash)?;
        self.files.read(salt)?;
        expect_position(self.files.position_read(), (hash.len() + salt.len()) as u64)
    }

    /// Write the in-memory record set to the container.
    ///
    /// Does nothing when nothing changed since the last init, load or save.
    /// The password hash and salt are carried over unchanged and the body is
    /// encrypted under the session key with a fresh header. An empty record set
    /// is written as a header-only container.
    #[instrument(skip_all, fields(cards = self.cards.len()))]
    pub fn save_store(&mut self) -> Result<(), SaveError> {
        if !self.dirty {
            debug!("no changes to save");
            return Ok(());
        }
        let session = self.session.as_ref().ok_or(SaveError::NoSession)?;
        let header = session
            .header_bytes(self.crypto.hash_len(), self.crypto.salt_len())
            .map_err(SaveError::Header)?;

        let body = if self.cards.is_empty() {
            None
        } else {
            let plaintext = codec::encode(&self.cards);
            let sealed = self
                .crypto
                .encrypt(plaintext.as_bytes(), &session.key)
                .map_err(SaveError::Encrypt)?;
            check_sealed(&self.crypto, plaintext.len(), &sealed).map_err(SaveError::Encrypt)?;
            Some(sealed)
        };

        match write_container(&mut self.files, &header, body.as_ref()) {
            Ok(()) => {
                self.dirty = false;
                debug!("record set saved");
                Ok(())
            }
            Err(failure) => {
                let err = match failure {
                    WriteFailure::Open(e) => SaveError::Open(e),
                    WriteFailure::Header(e) => SaveError::Header(e),
                    WriteFailure::Data(e) => SaveError::WriteData(e),
                    WriteFailure::Commit(e) => {
                        if e.is_committed() {
                            self.dirty = false;
                        }
                        SaveError::Commit(e)
                    }
                };
                warn!(error = %err, "saving record set failed");
                Err(err)
            }
        }
    }

    /// Append a card. It is not persisted until the next save.
    ///
    /// Incomplete cards are rejected so that every saved record set decodes.
    pub fn add_card(&mut self, card: Card) -> Result<(), CardError> {
        card.validate()?;
        self.cards.push(card);
        self.dirty = true;
        Ok(())
    }

    /// Remove the card at `index`, shifting later cards down by one.
    pub fn delete_card(&mut self, index: usize) -> Option<Card> {
        if index >= self.cards.len() {
            return None;
        }
        let card = self.cards.remove(index);
        self.dirty = true;
        Some(card)
    }

    /// `(index, display name)` for every card, in order.
    pub fn cards_display_list(&self) -> Vec<(usize, String)> {
        self.cards
            .iter()
            .enumerate()
            .map(|(index, card)| (index, card.display_name()))
            .collect()
    }

    pub fn get_card_by_id(&self, index: usize) -> Option<&Card> {
        self.cards.get(index)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Whether the record set changed since the last init, load or save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn store_exists(&self, slot: FileSlot) -> bool {
        self.files.exists(slot)
    }

    /// Remove a file. Deleting the container also ends the session.
    #[instrument(skip(self))]
    pub fn delete_store(&mut self, slot: FileSlot) -> Result<(), FileIoError> {
        self.files.delete(slot)?;
        if slot == FileSlot::Main {
            self.close();
        }
        Ok(())
    }

    /// Drop the record set and wipe the session secrets. Unsaved changes are
    /// discarded.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.wipe(&self.crypto);
        }
        self.cards.clear();
        self.dirty = false;
    }

    fn start_session(&mut self, session: Session, cards: Vec<Card>) {
        self.close();
        self.session = Some(session);
        self.cards = cards;
    }
}

impl<C: Crypto, F: FileIo> Drop for Store<C, F> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Temp write, close and commit. The temp file is discarded if anything before
/// the commit fails; the commit rolls itself back.
fn write_container<F: FileIo>(
    files: &mut F,
    header: &[u8],
    body: Option<&Sealed>,
) -> Result<(), WriteFailure> {
    files.open_write_temp().map_err(WriteFailure::Open)?;
    let written = write_contents(files, header, body);
    let closed = files.close_write_temp().map_err(WriteFailure::Data);
    if let Err(failure) = written.and(closed) {
        discard_temp(files);
        return Err(failure);
    }
    files.commit_temp().map_err(WriteFailure::Commit)
}

fn write_contents<F: FileIo>(
    files: &mut F,
    header: &[u8],
    body: Option<&Sealed>,
) -> Result<(), WriteFailure> {
    expect_position(files.position_write_temp(), 0).map_err(WriteFailure::Header)?;
    files
        .write_temp(header)
        .map_err(|e| WriteFailure::Header(e.into()))?;
    expect_position(files.position_write_temp(), header.len() as u64)
        .map_err(WriteFailure::Header)?;

    if let Some(sealed) = body {
        files.write_temp(&sealed.header).map_err(WriteFailure::Data)?;
        files
            .write_temp(&sealed.ciphertext)
            .map_err(WriteFailure::Data)?;
    }
    Ok(())
}

fn discard_temp<F: FileIo>(files: &mut F) {
    if let Err(err) = files.delete(FileSlot::Temp) {
        if !err.is_not_found() {
            warn!(error = %err, "removing temp file failed");
        }
    }
}

fn expect_position(actual: Result<u64, FileIoError>, expected: u64) -> Result<(), HeaderError> {
    let actual = actual?;
    if actual != expected {
        return Err(HeaderError::Misplaced { expected, actual });
    }
    Ok(())
}

fn check_key<C: Crypto>(crypto: &C, key: SecretBytes) -> Result<SecretBytes, CryptoError> {
    if key.len() != crypto.key_len() {
        return Err(CryptoError::KeyDerivation {
            reason: format!("derived a {}-byte key, expected {}", key.len(), crypto.key_len()),
        });
    }
    Ok(key)
}

fn check_sealed<C: Crypto>(
    crypto: &C,
    plaintext_len: usize,
    sealed: &Sealed,
) -> Result<(), CryptoError> {
    let expected = plaintext_len + crypto.added_bytes();
    if sealed.header.len() != crypto.header_len() || sealed.ciphertext.len() != expected {
        return Err(CryptoError::Encrypt {
            reason: format!(
                "sealed output is {}+{} bytes, expected {}+{expected}",
                sealed.header.len(),
                sealed.ciphertext.len(),
                crypto.header_len()
            ),
        });
    }
    Ok(())
}
