//! Platform keystore integration and the process master key
//!
//! A [`PlatformKeystore`] seals and unseals the master key; [`SecureKeyStore`]
//! owns the sealed blob on disk and hands out the unsealed key:
//! - [`MockKeystore`]: tests, and hosts without secure storage
//! - [`DeviceBoundKeystore`]: seals with a key bound to the current user and host
//! - `KeyringKeystore`: OS credential store (`native-keystore` feature)

use crate::atomic_file::write_new;
use crate::{Error, MasterKey, Result, SealedKey};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default alias of the process master key
pub const DEFAULT_MASTER_KEY_ALIAS: &str = "_inventory_master_key_";

/// Platform capabilities for secure storage
#[derive(Debug, Clone)]
pub struct KeystoreCapabilities {
    /// Key material is protected by an OS service rather than a file
    pub has_secure_hardware: bool,
    /// Keystore can currently be reached
    pub available: bool,
    /// Platform name
    pub platform: Platform,
}

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Android
    Android,
    /// iOS
    Ios,
    /// macOS
    MacOs,
    /// Windows
    Windows,
    /// Linux
    Linux,
    /// Unknown platform
    Unknown,
}

impl Platform {
    /// Detect current platform at compile time
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }
}

/// Keystore result for operations that may require user interaction
#[derive(Debug)]
pub enum KeystoreResult<T> {
    /// Success
    Success(T),
    /// Authentication failed
    AuthFailed,
    /// Keystore not available on this platform
    NotAvailable,
    /// Error occurred
    Error(Error),
}

impl<T> From<Result<T>> for KeystoreResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => KeystoreResult::Success(v),
            Err(e) => KeystoreResult::Error(e),
        }
    }
}

impl<T> KeystoreResult<T> {
    /// Collapse into a [`Result`], reporting every non-success outcome as
    /// [`Error::KeyStoreUnavailable`].
    pub fn into_result(self) -> Result<T> {
        match self {
            KeystoreResult::Success(v) => Ok(v),
            KeystoreResult::AuthFailed => Err(Error::KeyStoreUnavailable(
                "authentication failed".to_string(),
            )),
            KeystoreResult::NotAvailable => Err(Error::KeyStoreUnavailable(
                "keystore not available".to_string(),
            )),
            KeystoreResult::Error(e @ Error::KeyStoreUnavailable(_)) => Err(e),
            KeystoreResult::Error(e) => Err(Error::KeyStoreUnavailable(e.to_string())),
        }
    }
}

/// Platform keystore abstraction
pub trait PlatformKeystore: Send + Sync {
    /// Get platform capabilities
    fn capabilities(&self) -> KeystoreCapabilities;

    /// Seal (encrypt) a master key under `key_id`
    fn seal_key(&self, key: &MasterKey, key_id: &str) -> Result<SealedKey>;

    /// Unseal (decrypt) a master key
    fn unseal_key(&self, sealed: &SealedKey) -> KeystoreResult<MasterKey>;
}

/// Mock keystore for testing and platforms without native integration
pub struct MockKeystore {
    available: bool,
}

impl MockKeystore {
    const XOR_KEY: u8 = 0x5A;

    /// Create new mock keystore
    pub fn new() -> Self {
        Self { available: true }
    }

    /// Keystore that behaves as if secure storage cannot be reached
    pub fn unavailable() -> Self {
        Self { available: false }
    }

    fn xor(bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|b| b ^ Self::XOR_KEY).collect()
    }
}

impl Default for MockKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformKeystore for MockKeystore {
    fn capabilities(&self) -> KeystoreCapabilities {
        KeystoreCapabilities {
            has_secure_hardware: false,
            available: self.available,
            platform: Platform::current(),
        }
    }

    fn seal_key(&self, key: &MasterKey, key_id: &str) -> Result<SealedKey> {
        if !self.available {
            return Err(Error::KeyStoreUnavailable("mock keystore offline".to_string()));
        }
        Ok(SealedKey::new(Self::xor(key.as_bytes()), key_id.to_string()))
    }

    fn unseal_key(&self, sealed: &SealedKey) -> KeystoreResult<MasterKey> {
        if !self.available {
            return KeystoreResult::NotAvailable;
        }
        MasterKey::from_bytes(&Self::xor(&sealed.encrypted_key)).into()
    }
}

/// Keystore that wraps the master key with a key derived from the local
/// user and host names. The sealed blob is useless on another machine.
pub struct DeviceBoundKeystore {
    wrapping_key: MasterKey,
}

impl DeviceBoundKeystore {
    /// Create keystore bound to this device
    pub fn new() -> Result<Self> {
        let user = whoami::username();
        let host = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());
        Self::for_identity(&user, &host)
    }

    /// Create keystore bound to an explicit identity
    pub fn for_identity(user: &str, host: &str) -> Result<Self> {
        let seed = format!("INVENTORY-DEVICE-KEY:{}:{}", user, host);
        let digest = Sha256::digest(seed.as_bytes());
        Ok(Self {
            wrapping_key: MasterKey::from_bytes(&digest)?,
        })
    }
}

impl PlatformKeystore for DeviceBoundKeystore {
    fn capabilities(&self) -> KeystoreCapabilities {
        KeystoreCapabilities {
            has_secure_hardware: false,
            available: true,
            platform: Platform::current(),
        }
    }

    fn seal_key(&self, key: &MasterKey, key_id: &str) -> Result<SealedKey> {
        let encrypted = self
            .wrapping_key
            .encrypt_with_aad(key.as_bytes(), key_id.as_bytes())?;
        Ok(SealedKey::new(encrypted, key_id.to_string()))
    }

    fn unseal_key(&self, sealed: &SealedKey) -> KeystoreResult<MasterKey> {
        match self
            .wrapping_key
            .decrypt_with_aad(&sealed.encrypted_key, sealed.key_id.as_bytes())
        {
            Ok(bytes) => MasterKey::from_bytes(&bytes).into(),
            Err(_) => KeystoreResult::AuthFailed,
        }
    }
}

/// OS credential store (Keychain, Credential Manager, kernel keyutils).
///
/// Key material lives in the credential store under `<alias>.<fingerprint>`,
/// so two racing creators never overwrite each other's credential. The sealed
/// blob on disk only records that account name.
#[cfg(feature = "native-keystore")]
pub struct KeyringKeystore {
    service: String,
}

#[cfg(feature = "native-keystore")]
impl KeyringKeystore {
    /// Create keystore for a credential-store service name
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key_id: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key_id)
            .map_err(|e| Error::KeyStoreUnavailable(e.to_string()))
    }
}

#[cfg(feature = "native-keystore")]
impl PlatformKeystore for KeyringKeystore {
    fn capabilities(&self) -> KeystoreCapabilities {
        KeystoreCapabilities {
            has_secure_hardware: true,
            available: keyring::Entry::new(&self.service, "availability-check").is_ok(),
            platform: Platform::current(),
        }
    }

    fn seal_key(&self, key: &MasterKey, key_id: &str) -> Result<SealedKey> {
        let account = format!("{}.{}", key_id, key.fingerprint());
        self.entry(&account)?
            .set_password(&hex::encode(key.as_bytes()))
            .map_err(|e| Error::KeyStoreUnavailable(e.to_string()))?;
        Ok(SealedKey::new(account.into_bytes(), key_id.to_string()))
    }

    fn unseal_key(&self, sealed: &SealedKey) -> KeystoreResult<MasterKey> {
        let account = match std::str::from_utf8(&sealed.encrypted_key) {
            Ok(account) if !account.is_empty() => account,
            _ => sealed.key_id.as_str(),
        };
        let entry = match self.entry(account) {
            Ok(entry) => entry,
            Err(e) => return KeystoreResult::Error(e),
        };
        match entry.get_password() {
            Ok(encoded) => match hex::decode(encoded) {
                Ok(bytes) => MasterKey::from_bytes(&bytes).into(),
                Err(e) => KeystoreResult::Error(Error::Encryption(e.to_string())),
            },
            Err(keyring::Error::NoStorageAccess(_)) | Err(keyring::Error::PlatformFailure(_)) => {
                KeystoreResult::NotAvailable
            }
            Err(e) => KeystoreResult::Error(Error::KeyStoreUnavailable(e.to_string())),
        }
    }
}

/// Owns the process master key: generated once, sealed through a
/// [`PlatformKeystore`], persisted as `<alias>.sealed` in the key directory.
pub struct SecureKeyStore {
    keystore: Arc<dyn PlatformKeystore>,
    key_dir: PathBuf,
    alias: String,
    cached: Mutex<Option<MasterKey>>,
}

impl SecureKeyStore {
    /// Create key store; no I/O happens until the key is first requested
    pub fn new(
        keystore: Arc<dyn PlatformKeystore>,
        key_dir: impl Into<PathBuf>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            keystore,
            key_dir: key_dir.into(),
            alias: alias.into(),
            cached: Mutex::new(None),
        }
    }

    /// Alias the master key is stored under
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Path of the sealed key blob
    pub fn sealed_key_path(&self) -> PathBuf {
        self.key_dir.join(format!("{}.sealed", self.alias))
    }

    /// Return the master key, generating and sealing it on first use.
    ///
    /// Later calls (and later processes) get the same key back.
    pub fn get_or_create_master_key(&self) -> Result<MasterKey> {
        let mut cached = self.cached.lock();
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        if !self.keystore.capabilities().available {
            return Err(Error::KeyStoreUnavailable(format!(
                "keystore for '{}' cannot be reached",
                self.alias
            )));
        }

        let path = self.sealed_key_path();
        let key = match load_sealed_key(&path)? {
            Some(sealed) => {
                let key = self.keystore.unseal_key(&sealed).into_result()?;
                tracing::debug!(
                    alias = %self.alias,
                    fingerprint = %key.fingerprint(),
                    "Unsealed master key"
                );
                key
            }
            None => self.create_master_key(&path)?,
        };

        *cached = Some(key.clone());
        Ok(key)
    }

    /// Generate and seal a new key. When another store has written the sealed
    /// blob in the meantime, its key is adopted and ours is dropped.
    fn create_master_key(&self, path: &Path) -> Result<MasterKey> {
        let key = MasterKey::generate();
        let sealed = self
            .keystore
            .seal_key(&key, &self.alias)
            .map_err(|e| match e {
                Error::KeyStoreUnavailable(_) => e,
                other => Error::KeyStoreUnavailable(other.to_string()),
            })?;

        if write_new(path, &sealed.serialize())? {
            tracing::info!(
                alias = %self.alias,
                fingerprint = %key.fingerprint(),
                "Created master key"
            );
            return Ok(key);
        }

        let winner = load_sealed_key(path)?.ok_or_else(|| {
            Error::KeyStoreUnavailable(format!("sealed key for '{}' vanished", self.alias))
        })?;
        let key = self.keystore.unseal_key(&winner).into_result()?;
        tracing::info!(
            alias = %self.alias,
            fingerprint = %key.fingerprint(),
            "Adopted master key created concurrently"
        );
        Ok(key)
    }
}

fn load_sealed_key(path: &Path) -> Result<Option<SealedKey>> {
    match std::fs::read(path) {
        Ok(bytes) => SealedKey::deserialize(&bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_keystore_seal_unseal() {
        let keystore = MockKeystore::new();
        let master_key = MasterKey::generate();

        let sealed = keystore.seal_key(&master_key, "test_key").unwrap();
        assert_eq!(sealed.key_id, "test_key");
        assert_ne!(sealed.encrypted_key.as_slice(), master_key.as_bytes());

        let unsealed = keystore.unseal_key(&sealed).into_result().unwrap();
        assert_eq!(unsealed.as_bytes(), master_key.as_bytes());
    }

    #[test]
    fn test_unavailable_mock_keystore() {
        let keystore = MockKeystore::unavailable();
        assert!(!keystore.capabilities().available);
        assert!(matches!(
            keystore.seal_key(&MasterKey::generate(), "k"),
            Err(Error::KeyStoreUnavailable(_))
        ));
    }

    #[test]
    fn test_device_bound_keystore_is_identity_specific() {
        let here = DeviceBoundKeystore::for_identity("alice", "workstation").unwrap();
        let elsewhere = DeviceBoundKeystore::for_identity("alice", "laptop").unwrap();
        let key = MasterKey::generate();

        let sealed = here.seal_key(&key, DEFAULT_MASTER_KEY_ALIAS).unwrap();

        let unsealed = here.unseal_key(&sealed).into_result().unwrap();
        assert_eq!(unsealed.as_bytes(), key.as_bytes());
        assert!(matches!(elsewhere.unseal_key(&sealed), KeystoreResult::AuthFailed));
    }

    #[test]
    fn test_get_or_create_returns_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecureKeyStore::new(Arc::new(MockKeystore::new()), dir.path(), "alias");

        let first = store.get_or_create_master_key().unwrap();
        let second = store.get_or_create_master_key().unwrap();

        assert_eq!(first.as_bytes(), second.as_bytes());
        assert!(store.sealed_key_path().exists());
    }

    #[test]
    fn test_key_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let first = SecureKeyStore::new(Arc::new(MockKeystore::new()), dir.path(), "alias")
            .get_or_create_master_key()
            .unwrap();

        let reopened = SecureKeyStore::new(Arc::new(MockKeystore::new()), dir.path(), "alias")
            .get_or_create_master_key()
            .unwrap();

        assert_eq!(first.as_bytes(), reopened.as_bytes());
    }

    #[test]
    fn test_unavailable_keystore_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecureKeyStore::new(Arc::new(MockKeystore::unavailable()), dir.path(), "alias");

        let err = store.get_or_create_master_key().unwrap_err();
        assert!(err.is_key_store_failure());
        assert!(!store.sealed_key_path().exists());
    }

    #[test]
    fn test_foreign_sealed_key_is_keystore_failure() {
        let dir = tempfile::tempdir().unwrap();
        let alias = "alias";
        let other = DeviceBoundKeystore::for_identity("bob", "elsewhere").unwrap();
        SecureKeyStore::new(Arc::new(other), dir.path(), alias)
            .get_or_create_master_key()
            .unwrap();

        let local = DeviceBoundKeystore::for_identity("alice", "here").unwrap();
        let err = SecureKeyStore::new(Arc::new(local), dir.path(), alias)
            .get_or_create_master_key()
            .unwrap_err();

        assert!(err.is_key_store_failure());
    }
}
