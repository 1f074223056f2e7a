use std::path::PathBuf;

use cardvault_storage::{aead_crypto::AeadCrypto, fs_file_io::FsFileIo};
use cardvault_store::Store;
use color_eyre::Result;
use dirs::data_dir;
use tracing::debug;

use crate::config::Config;

/// File name of the container inside the data directory.
pub const STORE_FILE: &str = "cardvault.store";

/// Store over the real Argon2id/AES-GCM and filesystem capabilities.
pub type CardStore = Store<AeadCrypto, FsFileIo>;

/// Resolve the default data directory for CardVault.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("cardvault"))
}

/// Container path, honouring the config's `data_dir` override.
pub fn store_path(config: &Config) -> Result<PathBuf> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    Ok(root.join(STORE_FILE))
}

/// Build the store described by the config.
pub fn store_from_config(config: &Config) -> Result<CardStore> {
    let path = store_path(config)?;
    let params = config.kdf.unwrap_or_default();
    debug!(path = %path.display(), ?params, "opening card store");
    Ok(Store::new(AeadCrypto::new(params)?, FsFileIo::new(path)))
}

/// Helper for tests: a store rooted at a temp dir with the cheapest KDF cost.
#[cfg(test)]
pub fn test_store(root: impl Into<PathBuf>) -> CardStore {
    let config = Config {
        data_dir: Some(root.into()),
        kdf: Some(cardvault_storage::aead_crypto::KdfParams::minimal()),
    };
    store_from_config(&config).expect("test store")
}
