use cardvault_core::{
    capability::{Crypto, FileIo, FileSlot},
    card::{Card, CardError},
};
use cardvault_store::{InitError, LoadError, SaveError, Store};
use color_eyre::{
    eyre::{bail, eyre, Report},
    Result,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{cli::AddArgs, password::Password};

/// Create an empty store. The password is only asked for once it is clear the
/// store may be (re)created.
pub fn init<C: Crypto, F: FileIo>(
    store: &mut Store<C, F>,
    force: bool,
    password: impl FnOnce() -> Result<Password>,
) -> Result<()> {
    if store.store_exists(FileSlot::Main) && !force {
        bail!("a card store already exists; pass --force to replace it");
    }
    let password = password()?;
    store
        .init_new_store(password.as_bytes())
        .map_err(explain_init)
}

/// Load an existing store, clearing out a temp file left by an interrupted save.
pub fn open<C: Crypto, F: FileIo>(
    store: &mut Store<C, F>,
    password: impl FnOnce() -> Result<Password>,
) -> Result<()> {
    if !store.store_exists(FileSlot::Main) {
        bail!("no card store found; run `cardvault init` first");
    }
    if store.store_exists(FileSlot::Temp) {
        warn!("removing temp file left by an interrupted save");
        store.delete_store(FileSlot::Temp)?;
    }
    let password = password()?;
    store.load_store(password.as_bytes()).map_err(explain_load)
}

pub fn list_lines<C: Crypto, F: FileIo>(store: &Store<C, F>) -> Vec<String> {
    if store.is_empty() {
        return vec!["No cards yet. Add one with `cardvault add`.".to_string()];
    }
    store
        .cards_display_list()
        .into_iter()
        .map(|(index, name)| format!("{index:>3}  {name}"))
        .collect()
}

#[derive(Debug, Serialize)]
struct CardSummary {
    index: usize,
    name: String,
    network: &'static str,
    last4: String,
}

/// Index, label and network of every card. Never includes full numbers or CVVs.
pub fn list_json<C: Crypto, F: FileIo>(store: &Store<C, F>) -> Result<String> {
    let summaries: Vec<CardSummary> = store
        .cards()
        .iter()
        .enumerate()
        .map(|(index, card)| CardSummary {
            index,
            name: card.display_name(),
            network: card.network().as_str(),
            last4: card.number()[card.number().len().saturating_sub(4)..].to_string(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&summaries)?)
}

/// Validate, append and save. Returns the new card's index.
pub fn add<C: Crypto, F: FileIo>(store: &mut Store<C, F>, args: &AddArgs) -> Result<usize> {
    let card = card_from_args(args).map_err(explain_card)?;
    store.add_card(card).map_err(explain_card)?;
    store.save_store().map_err(explain_save)?;
    let index = store.len() - 1;
    debug!(index, "card added");
    Ok(index)
}

fn card_from_args(args: &AddArgs) -> Result<Card, CardError> {
    let mut card = Card::new();
    // Number first: the expected CVV length depends on the network.
    card.set_number(&args.number)?;
    card.set_cvv(&args.cvv)?;
    card.set_month(&args.month)?;
    card.set_year(&args.year)?;
    if let Some(name) = &args.name {
        card.set_name(name)?;
    }
    Ok(card)
}

pub fn show_lines<C: Crypto, F: FileIo>(
    store: &Store<C, F>,
    index: usize,
    reveal: bool,
) -> Result<Vec<String>> {
    let card = store
        .get_card_by_id(index)
        .ok_or_else(|| no_card(index, store.len()))?;
    Ok(card
        .display_fields(reveal)
        .into_iter()
        .map(|(label, value)| format!("{label:<7} {value}"))
        .collect())
}

/// Remove and save. Returns the removed card's display name.
pub fn delete<C: Crypto, F: FileIo>(store: &mut Store<C, F>, index: usize) -> Result<String> {
    let removed = store
        .delete_card(index)
        .ok_or_else(|| no_card(index, store.len()))?;
    store.save_store().map_err(explain_save)?;
    debug!(index, "card deleted");
    Ok(removed.display_name())
}

fn no_card(index: usize, len: usize) -> Report {
    match len {
        0 => eyre!("no card {index}: the store is empty"),
        _ => eyre!("no card {index}: valid indices are 0-{}", len - 1),
    }
}

fn explain_init(err: InitError) -> Report {
    let message = match &err {
        InitError::Hash(_) | InitError::KeyDerivation(_) => {
            "could not derive keys from the password"
        }
        InitError::TempOpen(_) => "could not create the store file",
        InitError::HeaderWrite(_) => "could not write the store file",
        InitError::Commit(e) if e.is_committed() => {
            "store created, but the old backup file could not be removed"
        }
        InitError::Commit(_) => "could not put the new store in place; the previous store is unchanged",
    };
    Report::new(err).wrap_err(message)
}

fn explain_load(err: LoadError) -> Report {
    let message = match &err {
        LoadError::Open(_) => "could not open the card store",
        LoadError::HeaderRead(_) => "the card store is damaged: its header is unreadable",
        LoadError::PasswordMismatch => "wrong master password",
        LoadError::KeyDerivation(_) => "could not derive the encryption key",
        LoadError::DataRead(_) => "the card store is damaged: its data is truncated",
        LoadError::DataDecrypt(_) => "the card store is damaged or has been tampered with",
        LoadError::DataDecode(_) => "the card store was decrypted but holds invalid records",
    };
    Report::new(err).wrap_err(message)
}

fn explain_card(err: CardError) -> Report {
    let field = err.field();
    Report::new(err).wrap_err(format!("invalid {}", field.label().to_lowercase()))
}

fn explain_save(err: SaveError) -> Report {
    let message = match &err {
        SaveError::NoSession => "no card store is open",
        SaveError::Encrypt(_) => "could not encrypt the cards; nothing was written",
        SaveError::Open(_) | SaveError::Header(_) | SaveError::WriteData(_) => {
            "could not write the card store; the previous version is unchanged"
        }
        SaveError::Commit(e) if e.is_committed() => {
            "cards saved, but the old backup file could not be removed"
        }
        SaveError::Commit(_) => {
            "could not put the new version in place; the previous version is unchanged"
        }
    };
    Report::new(err).wrap_err(message)
}

#[cfg(test)]
mod tests {
    use cardvault_core::testing::{FileFault, MemoryFileIo, MockCrypto};
    use zeroize::Zeroizing;

    use super::*;

    type MockStore = Store<MockCrypto, MemoryFileIo>;

    fn password(value: &str) -> impl FnOnce() -> Result<Password> + '_ {
        move || Ok(Zeroizing::new(value.to_string()))
    }

    fn args(number: &str, cvv: &str, name: Option<&str>) -> AddArgs {
        AddArgs {
            number: number.into(),
            cvv: cvv.into(),
            month: "12".into(),
            year: "2025".into(),
            name: name.map(Into::into),
        }
    }

    fn opened() -> (MockStore, MockCrypto, MemoryFileIo) {
        let crypto = MockCrypto::new();
        let files = MemoryFileIo::new();
        let mut store = Store::new(crypto.clone(), files.clone());
        init(&mut store, false, password("longenough")).expect("init");
        (store, crypto, files)
    }

    fn reopen(crypto: &MockCrypto, files: &MemoryFileIo) -> MockStore {
        let mut store = Store::new(crypto.clone(), files.clone());
        open(&mut store, password("longenough")).expect("open");
        store
    }

    #[test]
    fn init_refuses_to_replace_without_force() {
        let (_store, crypto, files) = opened();
        let mut again = Store::new(crypto.clone(), files.clone());
        let err = init(&mut again, false, || -> Result<Password> {
            panic!("password must not be asked for")
        })
        .expect_err("exists");
        assert!(err.to_string().contains("--force"));

        init(&mut again, true, password("different1")).expect("forced init");
        let mut other = Store::new(crypto, files);
        let err = open(&mut other, password("longenough")).expect_err("old password");
        assert_eq!(err.to_string(), "wrong master password");
    }

    #[test]
    fn open_requires_an_existing_store() {
        let mut store = Store::new(MockCrypto::new(), MemoryFileIo::new());
        let err = open(&mut store, password("longenough")).expect_err("missing");
        assert!(err.to_string().contains("cardvault init"));
    }

    #[test]
    fn open_removes_leftover_temp_file() {
        let (_store, crypto, files) = opened();
        let mut writer = files.clone();
        writer.open_write_temp().expect("open temp");
        writer.write_temp(b"partial").expect("write");
        writer.close_write_temp().expect("close");
        assert!(files.temp_bytes().is_some());

        reopen(&crypto, &files);
        assert!(files.temp_bytes().is_none());
    }

    #[test]
    fn damaged_store_gets_its_own_message() {
        let (_store, crypto, files) = opened();
        files.set_main_bytes(Some(vec![0u8; 3]));
        let mut store = Store::new(crypto, files);
        let err = open(&mut store, password("longenough")).expect_err("damaged");
        assert!(err.to_string().contains("header is unreadable"));
    }

    #[test]
    fn add_persists_and_lists() {
        let (mut store, crypto, files) = opened();
        assert_eq!(
            list_lines(&store),
            vec!["No cards yet. Add one with `cardvault add`.".to_string()]
        );

        let index = add(&mut store, &args("4111111111111111", "123", Some("Travel"))).expect("add");
        assert_eq!(index, 0);
        let index = add(&mut store, &args("378282246310005", "1234", None)).expect("add");
        assert_eq!(index, 1);

        let reopened = reopen(&crypto, &files);
        assert_eq!(
            list_lines(&reopened),
            vec![
                "  0  Travel".to_string(),
                "  1  American Express 0005".to_string(),
            ]
        );
    }

    #[test]
    fn invalid_card_is_rejected_before_saving() {
        let (mut store, _crypto, files) = opened();
        let writes = files.write_calls();

        let err = add(&mut store, &args("4111111111111112", "123", None)).expect_err("luhn");
        assert_eq!(err.to_string(), "invalid number");
        assert!(err.root_cause().to_string().contains("Luhn"));
        let err = add(&mut store, &args("378282246310005", "123", None)).expect_err("cvv");
        assert_eq!(err.to_string(), "invalid cvv");
        assert!(err.root_cause().to_string().contains("4 digits"));

        assert!(store.is_empty());
        assert!(!store.is_dirty());
        assert_eq!(files.write_calls(), writes);
    }

    #[test]
    fn failed_save_reports_unchanged_store() {
        let (mut store, _crypto, files) = opened();
        files.inject(FileFault::Commit);
        let err = add(&mut store, &args("4111111111111111", "123", None)).expect_err("commit");
        assert!(err.to_string().contains("previous version is unchanged"));
    }

    #[test]
    fn json_listing_omits_secrets() {
        let (mut store, _crypto, _files) = opened();
        add(&mut store, &args("4111111111111111", "123", Some("Travel"))).expect("add");

        let json = list_json(&store).expect("json");
        assert!(!json.contains("4111111111111111"));
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value[0]["index"], 0);
        assert_eq!(value[0]["name"], "Travel");
        assert_eq!(value[0]["network"], "Visa");
        assert_eq!(value[0]["last4"], "1111");
    }

    #[test]
    fn show_masks_unless_revealed() {
        let (mut store, _crypto, _files) = opened();
        add(&mut store, &args("4111111111111111", "123", Some("Travel"))).expect("add");

        let masked = show_lines(&store, 0, false).expect("show").join("\n");
        assert!(masked.contains("**** 1111"));
        assert!(!masked.contains("4111111111111111"));
        assert!(!masked.contains("123"));

        let revealed = show_lines(&store, 0, true).expect("show").join("\n");
        assert!(revealed.contains("4111111111111111"));
        assert!(revealed.contains("123"));

        let err = show_lines(&store, 5, false).expect_err("out of range");
        assert_eq!(err.to_string(), "no card 5: valid indices are 0-0");
    }

    #[test]
    fn delete_saves_and_shifts_indices() {
        let (mut store, crypto, files) = opened();
        add(&mut store, &args("4111111111111111", "123", Some("Travel"))).expect("add");
        add(&mut store, &args("5555555555554444", "321", Some("Work"))).expect("add");

        assert_eq!(delete(&mut store, 0).expect("delete"), "Travel");
        let reopened = reopen(&crypto, &files);
        assert_eq!(list_lines(&reopened), vec!["  0  Work".to_string()]);

        let mut empty = reopened;
        delete(&mut empty, 0).expect("delete");
        let err = delete(&mut empty, 0).expect_err("empty");
        assert_eq!(err.to_string(), "no card 0: the store is empty");
    }
}
