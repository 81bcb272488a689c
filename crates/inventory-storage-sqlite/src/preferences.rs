//! Encrypted key/value preferences file
//!
//! Key names never reach the disk: each is replaced by an HMAC-SHA256 tag, so
//! lookups stay deterministic. Values are AES-256-GCM envelopes bound to their
//! tag as associated data. Both keys are HKDF sub-keys of the master key,
//! salted with the file name so two preference files never share keys.
//!
//! File layout (JSON):
//! `{ "version": 1, "entries": { "<hex tag>": "<hex envelope>" } }`

use crate::atomic_file::write_atomic;
use crate::security::{MasterKey, KEY_LEN};
use crate::{Error, Result};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const FORMAT_VERSION: u32 = 1;
const VALUE_KEY_INFO: &str = "inventory-preferences-values";
const TAG_KEY_INFO: &str = "inventory-preferences-keys";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    version: u32,
    entries: BTreeMap<String, String>,
}

/// File-backed encrypted preference map
pub struct EncryptedPreferences {
    path: PathBuf,
    value_key: MasterKey,
    tag_key: Zeroizing<[u8; KEY_LEN]>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl EncryptedPreferences {
    /// Open the preference file at `path`, verifying every stored entry.
    ///
    /// A missing file is an empty map. A file that cannot be parsed, or any
    /// entry that does not decrypt under `master_key`, fails with
    /// [`Error::StoreInit`]; there is no fallback.
    pub fn open(path: impl Into<PathBuf>, master_key: &MasterKey) -> Result<Self> {
        let path = path.into();
        let salt = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let value_key = MasterKey::from_bytes(
            master_key
                .derive_subkey(Some(salt.as_bytes()), VALUE_KEY_INFO)?
                .as_ref(),
        )?;
        let tag_key = master_key.derive_subkey(Some(salt.as_bytes()), TAG_KEY_INFO)?;

        let file = read_file(&path)?;
        let prefs = Self {
            path,
            value_key,
            tag_key,
            entries: Mutex::new(file.entries),
        };
        prefs.verify_all()?;

        tracing::debug!(
            path = %prefs.path.display(),
            entries = prefs.entries.lock().len(),
            "Opened encrypted preferences"
        );
        Ok(prefs)
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the value stored under `name`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let tag = self.tag(name)?;
        let envelope = match self.entries.lock().get(&tag) {
            Some(envelope) => envelope.clone(),
            None => return Ok(None),
        };

        let plaintext = self.open_envelope(&tag, &envelope)?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    /// Store `value` under `name`; durable once this returns
    pub fn put<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let tag = self.tag(name)?;
        let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
        let envelope = hex::encode(
            self.value_key
                .encrypt_with_aad(&plaintext, tag.as_bytes())?,
        );

        let mut entries = self.entries.lock();
        let previous = entries.insert(tag.clone(), envelope);
        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(old) => entries.insert(tag, old),
                None => entries.remove(&tag),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Remove `name`; returns whether it was present
    pub fn remove(&self, name: &str) -> Result<bool> {
        let tag = self.tag(name)?;
        let mut entries = self.entries.lock();
        let Some(previous) = entries.remove(&tag) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&entries) {
            entries.insert(tag, previous);
            return Err(e);
        }
        Ok(true)
    }

    /// Whether a value is stored under `name`
    pub fn contains(&self, name: &str) -> Result<bool> {
        let tag = self.tag(name)?;
        Ok(self.entries.lock().contains_key(&tag))
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tag(&self, name: &str) -> Result<String> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(self.tag_key.as_ref())
            .map_err(|e| Error::Encryption(e.to_string()))?;
        mac.update(name.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn open_envelope(&self, tag: &str, envelope: &str) -> Result<Zeroizing<Vec<u8>>> {
        let bytes = hex::decode(envelope)
            .map_err(|e| Error::Encryption(format!("corrupt preference entry: {}", e)))?;
        Ok(Zeroizing::new(
            self.value_key.decrypt_with_aad(&bytes, tag.as_bytes())?,
        ))
    }

    fn verify_all(&self) -> Result<()> {
        let entries = self.entries.lock();
        for (tag, envelope) in entries.iter() {
            self.open_envelope(tag, envelope).map_err(|e| {
                Error::StoreInit(format!(
                    "preferences at {} cannot be decrypted with the current key: {}",
                    self.path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let file = PreferencesFile {
            version: FORMAT_VERSION,
            entries: entries.clone(),
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&file)?)
    }
}

fn read_file(path: &Path) -> Result<PreferencesFile> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(PreferencesFile {
                version: FORMAT_VERSION,
                entries: BTreeMap::new(),
            })
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let file: PreferencesFile = serde_json::from_slice(&bytes).map_err(|e| {
        Error::StoreInit(format!("preferences at {} are unreadable: {}", path.display(), e))
    })?;
    if file.version != FORMAT_VERSION {
        return Err(Error::StoreInit(format!(
            "unsupported preferences format version {}",
            file.version
        )));
    }
    Ok(file)
}
