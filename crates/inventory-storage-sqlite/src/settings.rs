//! User settings persisted in the encrypted preferences file

use crate::preferences::EncryptedPreferences;
use crate::security::MasterKey;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A recognised settings field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    /// Default supplier name for new items
    DefaultShipperName,
    /// Default supplier email for new items
    DefaultShipperEmail,
    /// Default supplier phone for new items
    DefaultShipperPhone,
    /// Prefill new items with the default supplier fields
    EnableDefaultFields,
    /// Redact supplier email and phone in shared text
    HideSensitiveData,
    /// Allow sharing item details
    EnableSharing,
}

impl SettingsField {
    /// Every field, in display order
    pub const ALL: [SettingsField; 6] = [
        SettingsField::DefaultShipperName,
        SettingsField::DefaultShipperEmail,
        SettingsField::DefaultShipperPhone,
        SettingsField::EnableDefaultFields,
        SettingsField::HideSensitiveData,
        SettingsField::EnableSharing,
    ];

    /// Preference key the field is stored under
    pub const fn key(self) -> &'static str {
        match self {
            SettingsField::DefaultShipperName => "supplier_name_key",
            SettingsField::DefaultShipperEmail => "supplier_email_key",
            SettingsField::DefaultShipperPhone => "supplier_phone_key",
            SettingsField::EnableDefaultFields => "default_fields_key",
            SettingsField::HideSensitiveData => "sensitive_data_key",
            SettingsField::EnableSharing => "share_key",
        }
    }

    /// Look a field up by its preference key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// Value used while nothing has been stored
    pub fn default_value(self) -> SettingValue {
        if self.is_flag() {
            SettingValue::Flag(false)
        } else {
            SettingValue::Text(String::new())
        }
    }

    /// Whether the field holds a boolean
    pub const fn is_flag(self) -> bool {
        matches!(
            self,
            SettingsField::EnableDefaultFields
                | SettingsField::HideSensitiveData
                | SettingsField::EnableSharing
        )
    }
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Value of a settings field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// String field
    Text(String),
    /// Boolean field
    Flag(bool),
}

impl SettingValue {
    /// Text content, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(text) => Some(text),
            SettingValue::Flag(_) => None,
        }
    }

    /// Flag content, if this is a flag value
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            SettingValue::Flag(flag) => Some(*flag),
            SettingValue::Text(_) => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Text(text) => f.write_str(text),
            SettingValue::Flag(flag) => write!(f, "{}", flag),
        }
    }
}

/// Snapshot of every settings field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    /// Default supplier name
    pub default_shipper_name: String,
    /// Default supplier email
    pub default_shipper_email: String,
    /// Default supplier phone
    pub default_shipper_phone: String,
    /// Prefill new items with defaults
    pub enable_default_fields: bool,
    /// Redact supplier contact details when sharing
    pub hide_sensitive_data: bool,
    /// Sharing allowed
    pub enable_sharing: bool,
}

/// Settings store over [`EncryptedPreferences`]
pub struct SettingsStore {
    prefs: EncryptedPreferences,
}

impl SettingsStore {
    /// Open the settings file. Call once at start-up before any get/set.
    pub fn init(path: impl Into<PathBuf>, master_key: &MasterKey) -> Result<Self> {
        let prefs = EncryptedPreferences::open(path, master_key)?;
        tracing::info!(path = %prefs.path().display(), "Settings store ready");
        Ok(Self { prefs })
    }

    /// Current value of `field`, or its default when unset
    pub fn get(&self, field: SettingsField) -> Result<SettingValue> {
        let value = if field.is_flag() {
            self.prefs.get::<bool>(field.key())?.map(SettingValue::Flag)
        } else {
            self.prefs.get::<String>(field.key())?.map(SettingValue::Text)
        };
        Ok(value.unwrap_or_else(|| field.default_value()))
    }

    /// Store `value` for `field`. The value kind must match the field.
    pub fn set(&self, field: SettingsField, value: SettingValue) -> Result<()> {
        match (field.is_flag(), &value) {
            (true, SettingValue::Flag(flag)) => self.prefs.put(field.key(), flag)?,
            (false, SettingValue::Text(text)) => self.prefs.put(field.key(), text.as_str())?,
            _ => {
                return Err(Error::ConstraintViolation(format!(
                    "{} expects a {} value",
                    field,
                    if field.is_flag() { "boolean" } else { "text" }
                )))
            }
        }
        tracing::debug!(field = field.key(), "Setting saved");
        Ok(())
    }

    fn text(&self, field: SettingsField) -> Result<String> {
        Ok(self.get(field)?.as_text().unwrap_or_default().to_string())
    }

    fn flag(&self, field: SettingsField) -> Result<bool> {
        Ok(self.get(field)?.as_flag().unwrap_or(false))
    }

    /// Default supplier name
    pub fn default_shipper_name(&self) -> Result<String> {
        self.text(SettingsField::DefaultShipperName)
    }

    /// Default supplier email
    pub fn default_shipper_email(&self) -> Result<String> {
        self.text(SettingsField::DefaultShipperEmail)
    }

    /// Default supplier phone
    pub fn default_shipper_phone(&self) -> Result<String> {
        self.text(SettingsField::DefaultShipperPhone)
    }

    /// Whether new items are prefilled with the defaults
    pub fn enable_default_fields(&self) -> Result<bool> {
        self.flag(SettingsField::EnableDefaultFields)
    }

    /// Whether supplier contact details are redacted when sharing
    pub fn hide_sensitive_data(&self) -> Result<bool> {
        self.flag(SettingsField::HideSensitiveData)
    }

    /// Whether sharing is allowed
    pub fn enable_sharing(&self) -> Result<bool> {
        self.flag(SettingsField::EnableSharing)
    }

    /// Read every field
    pub fn load(&self) -> Result<SettingsRecord> {
        Ok(SettingsRecord {
            default_shipper_name: self.default_shipper_name()?,
            default_shipper_email: self.default_shipper_email()?,
            default_shipper_phone: self.default_shipper_phone()?,
            enable_default_fields: self.enable_default_fields()?,
            hide_sensitive_data: self.hide_sensitive_data()?,
            enable_sharing: self.enable_sharing()?,
        })
    }

    /// Write every field, one independent write per field.
    ///
    /// Not atomic: a failure part-way leaves the earlier fields written.
    pub fn save(&self, record: &SettingsRecord) -> Result<()> {
        use SettingValue::{Flag, Text};

        self.set(SettingsField::DefaultShipperName, Text(record.default_shipper_name.clone()))?;
        self.set(SettingsField::DefaultShipperEmail, Text(record.default_shipper_email.clone()))?;
        self.set(SettingsField::DefaultShipperPhone, Text(record.default_shipper_phone.clone()))?;
        self.set(SettingsField::EnableDefaultFields, Flag(record.enable_default_fields))?;
        self.set(SettingsField::HideSensitiveData, Flag(record.hide_sensitive_data))?;
        self.set(SettingsField::EnableSharing, Flag(record.enable_sharing))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &tempfile::TempDir, key: &MasterKey) -> SettingsStore {
        SettingsStore::init(dir.path().join("inventory_prefs.json"), key).unwrap()
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, &MasterKey::generate());

        assert_eq!(store.load().unwrap(), SettingsRecord::default());
    }

    #[test]
    fn test_every_field_round_trips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::generate();
        let values = [
            (SettingsField::DefaultShipperName, SettingValue::Text("Acme".into())),
            (SettingsField::DefaultShipperEmail, SettingValue::Text("a@acme.io".into())),
            (SettingsField::DefaultShipperPhone, SettingValue::Text("+1555".into())),
            (SettingsField::EnableDefaultFields, SettingValue::Flag(true)),
            (SettingsField::HideSensitiveData, SettingValue::Flag(true)),
            (SettingsField::EnableSharing, SettingValue::Flag(true)),
        ];

        let store = open(&dir, &key);
        for (field, value) in &values {
            store.set(*field, value.clone()).unwrap();
            assert_eq!(&store.get(*field).unwrap(), value);
        }
        drop(store);

        let store = open(&dir, &key);
        for (field, value) in &values {
            assert_eq!(&store.get(*field).unwrap(), value);
        }
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, &MasterKey::generate());

        let err = store
            .set(SettingsField::EnableSharing, SettingValue::Text("yes".into()))
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
    }

    #[test]
    fn test_keys_are_stable() {
        let keys: Vec<_> = SettingsField::ALL.iter().map(|f| f.key()).collect();
        assert_eq!(
            keys,
            [
                "supplier_name_key",
                "supplier_email_key",
                "supplier_phone_key",
                "default_fields_key",
                "sensitive_data_key",
                "share_key",
            ]
        );
        assert_eq!(SettingsField::from_key("share_key"), Some(SettingsField::EnableSharing));
        assert_eq!(SettingsField::from_key("bogus"), None);
    }
}
