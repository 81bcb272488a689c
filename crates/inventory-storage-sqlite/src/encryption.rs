//! Encryption key derivation for the item database

use crate::security::{MasterKey, KEY_LEN};
use crate::Result;
use zeroize::Zeroizing;

/// HKDF info string for the item database key
pub const ITEM_DATABASE_INFO: &str = "inventory-item-database";

/// Encryption key for database
pub struct EncryptionKey(Zeroizing<[u8; KEY_LEN]>);

impl EncryptionKey {
    /// Derive the item-database key from the master key
    pub fn for_item_database(master_key: &MasterKey) -> Result<Self> {
        Ok(Self(master_key.derive_subkey(None, ITEM_DATABASE_INFO)?))
    }

    /// Create from raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Raw-key form understood by `PRAGMA key`
    pub(crate) fn pragma_literal(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("\"x'{}'\"", hex::encode(&self.0[..])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_key_is_stable_per_master_key() {
        let master = MasterKey::generate();
        let a = EncryptionKey::for_item_database(&master).unwrap();
        let b = EncryptionKey::for_item_database(&master).unwrap();
        let other = EncryptionKey::for_item_database(&MasterKey::generate()).unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), other.as_bytes());
        assert_ne!(a.as_bytes(), master.as_bytes());
    }

    #[test]
    fn test_pragma_literal_is_raw_hex_key() {
        let key = EncryptionKey::from_bytes([0x11; KEY_LEN]);
        let literal = key.pragma_literal();

        assert!(literal.starts_with("\"x'1111"));
        assert_eq!(literal.len(), 5 + KEY_LEN * 2);
    }
}
