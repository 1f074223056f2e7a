//! Core abstractions for CardVault: the card record model, its flat-text codec,
//! and the crypto/file capability contracts the store engine is built on.
//! Nothing here touches the filesystem or a real cipher.

pub mod capability;
pub mod card;
pub mod codec;
pub mod testing;
pub mod validation;
