//! Security and encryption primitives
//!
//! Implements the process master key (AES-256-GCM), HKDF sub-key derivation
//! for the item database, preferences and export files, and the sealed-key
//! envelope handed to platform keystores.

use crate::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Length of the master key in bytes (256-bit)
pub const KEY_LEN: usize = 32;

/// Length of an AES-GCM nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Envelope version written by [`MasterKey::encrypt`]
const ENVELOPE_VERSION: u8 = 1;

/// Algorithm tag for AES-256-GCM in the envelope header
const ALGORITHM_AES_GCM: u8 = 0;

/// Envelope header: [version(1)][algorithm(1)][nonce(12)]
const ENVELOPE_HEADER_LEN: usize = 2 + NONCE_LEN;

/// Master key used to encrypt data at rest
#[derive(Clone)]
pub struct MasterKey {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl MasterKey {
    /// Generate new random master key
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(key.as_mut());
        Self { key }
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(Error::Encryption("Invalid key length".to_string()));
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Short, non-reversible fingerprint for logs and diagnostics
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.key[..]);
        hex::encode(&digest[..4])
    }

    /// Derive a purpose-bound 256-bit sub-key with HKDF-SHA256.
    ///
    /// The same `salt` and `info` always yield the same sub-key.
    pub fn derive_subkey(
        &self,
        salt: Option<&[u8]>,
        info: &str,
    ) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let hkdf = Hkdf::<Sha256>::new(salt, &self.key[..]);
        let mut out = Zeroizing::new([0u8; KEY_LEN]);
        hkdf.expand(info.as_bytes(), out.as_mut())
            .map_err(|e| Error::Encryption(format!("HKDF expand failed: {}", e)))?;
        Ok(out)
    }

    /// Encrypt data
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with_aad(plaintext, &[])
    }

    /// Decrypt data
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_aad(data, &[])
    }

    /// Encrypt data bound to associated data that must be presented again on decrypt
    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(self.key.as_ref().into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|e| Error::Encryption(e.to_string()))?;

        // Format: [version(1)][algorithm(1)][nonce(12)][ciphertext(variable)]
        let mut result = Vec::with_capacity(ENVELOPE_HEADER_LEN + ciphertext.len());
        result.push(ENVELOPE_VERSION);
        result.push(ALGORITHM_AES_GCM);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt data produced by [`MasterKey::encrypt_with_aad`]
    pub fn decrypt_with_aad(&self, data: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if data.len() < ENVELOPE_HEADER_LEN {
            return Err(Error::Encryption("Invalid ciphertext length".to_string()));
        }

        let version = data[0];
        let algorithm = data[1];

        if version != ENVELOPE_VERSION {
            return Err(Error::Encryption(format!(
                "Unsupported encryption version: {}",
                version
            )));
        }

        if algorithm != ALGORITHM_AES_GCM {
            return Err(Error::Encryption(format!(
                "Algorithm mismatch: expected AES-GCM (0), got {}",
                algorithm
            )));
        }

        let cipher = Aes256Gcm::new(self.key.as_ref().into());
        let nonce = Nonce::from_slice(&data[2..ENVELOPE_HEADER_LEN]);
        let ciphertext = &data[ENVELOPE_HEADER_LEN..];

        cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad })
            .map_err(|e| Error::Encryption(e.to_string()))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Generate random bytes with the OS generator
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

/// Sealed master key (encrypted with the platform keystore)
#[derive(Debug, Clone)]
pub struct SealedKey {
    /// Encrypted master key (may be empty when the keystore keeps the material itself)
    pub encrypted_key: Vec<u8>,
    /// Key identifier (the keystore alias)
    pub key_id: String,
}

impl SealedKey {
    const VERSION: u8 = 1;

    /// Create new sealed key
    pub fn new(encrypted_key: Vec<u8>, key_id: String) -> Self {
        Self {
            encrypted_key,
            key_id,
        }
    }

    /// Serialize for storage
    pub fn serialize(&self) -> Vec<u8> {
        let key_id_bytes = self.key_id.as_bytes();
        let mut data =
            Vec::with_capacity(1 + 4 + key_id_bytes.len() + 4 + self.encrypted_key.len());

        data.push(Self::VERSION);

        data.extend_from_slice(&(key_id_bytes.len() as u32).to_le_bytes());
        data.extend_from_slice(key_id_bytes);

        data.extend_from_slice(&(self.encrypted_key.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.encrypted_key);

        data
    }

    /// Deserialize from storage
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let invalid = || Error::Encryption("Invalid sealed key data".to_string());

        let (&version, rest) = data.split_first().ok_or_else(invalid)?;
        if version != Self::VERSION {
            return Err(Error::Encryption("Unknown sealed key version".to_string()));
        }

        let (key_id_bytes, rest) = read_length_prefixed(rest).ok_or_else(invalid)?;
        let key_id = String::from_utf8(key_id_bytes.to_vec())
            .map_err(|_| Error::Encryption("Sealed key id is not UTF-8".to_string()))?;

        let (encrypted_key, rest) = read_length_prefixed(rest).ok_or_else(invalid)?;
        if !rest.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            encrypted_key: encrypted_key.to_vec(),
            key_id,
        })
    }
}

fn read_length_prefixed(data: &[u8]) -> Option<(&[u8], &[u8])> {
    if data.len() < 4 {
        return None;
    }
    let (len_bytes, rest) = data.split_at(4);
    let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}
