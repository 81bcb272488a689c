//! Encrypted local storage for the inventory app
//!
//! Provides the SQLCipher-backed item store with change streams, the
//! encrypted settings map, the process master key and its keystore
//! integration, and encrypted export files.
//!
//! ## Security Features
//!
//! - **Master Key**: 256-bit AES-GCM key, sealed by a platform keystore
//! - **Database Encryption**: SQLCipher page encryption keyed by an HKDF sub-key
//! - **Preferences**: HMAC-tagged key names, AES-GCM values bound to their key
//! - **Export Files**: segmented AES-GCM with a per-file HKDF key

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod atomic_file;
pub mod database;
pub mod encrypted_file;
pub mod encryption;
pub mod error;
pub mod item_store;
pub mod keystore;
pub mod migrations;
pub mod models;
pub mod preferences;
pub mod security;
pub mod settings;

pub use database::Database;
pub use encrypted_file::{EncryptedFile, EncryptedFileWriter, SEGMENT_SIZE};
pub use encryption::EncryptionKey;
pub use error::{Error, Result};
pub use item_store::{ItemListStream, ItemStore, ItemStream};
#[cfg(feature = "native-keystore")]
pub use keystore::KeyringKeystore;
pub use keystore::{
    DeviceBoundKeystore, KeystoreCapabilities, KeystoreResult, MockKeystore, Platform,
    PlatformKeystore, SecureKeyStore, DEFAULT_MASTER_KEY_ALIAS,
};
pub use migrations::{MigrationOutcome, SCHEMA_VERSION};
pub use models::Item;
pub use preferences::EncryptedPreferences;
pub use security::{MasterKey, SealedKey};
pub use settings::{SettingValue, SettingsField, SettingsRecord, SettingsStore};
