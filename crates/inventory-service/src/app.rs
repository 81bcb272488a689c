//! Application container
//!
//! Owns the key store, settings, item store and repository for one data
//! directory, and hands out view states wired to them.

use crate::config::AppConfig;
use crate::item_details::{ItemDetailsContext, ItemDetailsViewState};
use crate::repository::{ItemsRepository, OfflineItemsRepository};
use crate::settings_view::SettingsViewState;
use crate::Result;
use inventory_storage_sqlite::{
    EncryptedFile, EncryptionKey, Item, ItemStore, MasterKey, PlatformKeystore, SecureKeyStore,
    SettingsStore,
};
use std::path::Path;
use std::sync::Arc;

/// Service name the OS credential store files the master key under
pub const KEYRING_SERVICE: &str = "inventory";

/// Wired-up application services
pub struct InventoryApp {
    config: AppConfig,
    key_store: SecureKeyStore,
    master_key: MasterKey,
    settings: Arc<SettingsStore>,
    store: ItemStore,
    repository: Arc<OfflineItemsRepository>,
}

impl InventoryApp {
    /// Open everything under `config.data_dir`.
    ///
    /// Fails with a key-store error when `keystore` cannot be reached, and
    /// with a store-init error when the settings file cannot be decrypted.
    pub fn init(config: AppConfig, keystore: Arc<dyn PlatformKeystore>) -> Result<Self> {
        config.ensure_dirs()?;

        let key_store = SecureKeyStore::new(keystore, &config.data_dir, &config.master_key_alias);
        let master_key = key_store.get_or_create_master_key()?;

        let settings = Arc::new(SettingsStore::init(config.preferences_path(), &master_key)?);

        let db_key = if config.encrypt_database {
            Some(EncryptionKey::for_item_database(&master_key)?)
        } else {
            tracing::warn!("Item database encryption is disabled");
            None
        };
        let store = ItemStore::open(config.database_path(), db_key.as_ref())?;
        let repository = Arc::new(OfflineItemsRepository::new(store.clone()));

        tracing::info!(
            data_dir = %config.data_dir.display(),
            key = %master_key.fingerprint(),
            "Inventory app initialized"
        );

        Ok(Self {
            config,
            key_store,
            master_key,
            settings,
            store,
            repository,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Key store holding the master key
    pub fn key_store(&self) -> &SecureKeyStore {
        &self.key_store
    }

    /// Settings store
    pub fn settings(&self) -> Arc<SettingsStore> {
        Arc::clone(&self.settings)
    }

    /// Items repository
    pub fn repository(&self) -> Arc<dyn ItemsRepository> {
        self.repository.clone()
    }

    /// View state for one item
    pub fn item_details(&self, item_id: i64) -> ItemDetailsViewState {
        ItemDetailsViewState::new(
            item_id,
            self.repository(),
            ItemDetailsContext {
                settings: self.settings(),
                master_key: self.master_key.clone(),
                export_temp_dir: self.config.export_temp_dir(),
                linger: self.config.subscription_linger(),
            },
        )
    }

    /// View state for the settings form
    pub fn settings_view(&self) -> Result<SettingsViewState> {
        SettingsViewState::new(self.settings())
    }

    /// New item, prefilled with the default supplier when that setting is on
    pub fn new_item(&self, name: impl Into<String>, price: f64, quantity: i64) -> Result<Item> {
        let item = Item::new(name, price, quantity);
        if !self.settings.enable_default_fields()? {
            return Ok(item);
        }
        Ok(item.with_supplier(
            self.settings.default_shipper_name()?,
            self.settings.default_shipper_email()?,
            self.settings.default_shipper_phone()?,
        ))
    }

    /// Decrypt an exported item file written by
    /// [`ItemDetailsViewState::save_to_file`]
    pub fn read_export(&self, path: impl AsRef<Path>) -> Result<Item> {
        let bytes = EncryptedFile::new(path.as_ref(), &self.master_key).read_to_end()?;
        let item = serde_json::from_slice(&bytes).map_err(inventory_storage_sqlite::Error::from)?;
        Ok(item)
    }

    /// Close the item store; live streams end and later calls fail.
    pub fn close(self) {
        self.store.close();
        tracing::info!("Inventory app closed");
    }
}

/// Keystore used outside tests: the OS credential store when built with
/// `native-keystore`, otherwise the device-bound fallback.
pub fn default_keystore() -> Result<Arc<dyn PlatformKeystore>> {
    #[cfg(feature = "native-keystore")]
    {
        Ok(Arc::new(inventory_storage_sqlite::KeyringKeystore::new(
            KEYRING_SERVICE,
        )))
    }
    #[cfg(not(feature = "native-keystore"))]
    {
        inventory_storage_sqlite::DeviceBoundKeystore::new()
            .map(|ks| Arc::new(ks) as Arc<dyn PlatformKeystore>)
            .map_err(crate::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_storage_sqlite::{MockKeystore, SettingValue, SettingsField};

    fn app(dir: &tempfile::TempDir) -> InventoryApp {
        InventoryApp::init(AppConfig::in_dir(dir.path()), Arc::new(MockKeystore::new())).unwrap()
    }

    #[test]
    fn test_unavailable_keystore_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = InventoryApp::init(
            AppConfig::in_dir(dir.path()),
            Arc::new(MockKeystore::unavailable()),
        )
        .err()
        .unwrap();

        assert_eq!(err.user_message(), "Cannot access secure storage");
    }

    #[test]
    fn test_new_item_uses_defaults_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let settings = app.settings();
        settings
            .set(SettingsField::DefaultShipperName, SettingValue::Text("Acme".into()))
            .unwrap();

        assert_eq!(app.new_item("Bolt", 0.1, 5).unwrap().supplier_name, "");

        settings
            .set(SettingsField::EnableDefaultFields, SettingValue::Flag(true))
            .unwrap();
        assert_eq!(app.new_item("Bolt", 0.1, 5).unwrap().supplier_name, "Acme");
    }

    #[test]
    fn test_plain_database_when_encryption_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            encrypt_database: false,
            ..AppConfig::in_dir(dir.path())
        };
        let app = InventoryApp::init(config.clone(), Arc::new(MockKeystore::new())).unwrap();
        app.store.insert(&Item::new("Bolt", 0.1, 5)).unwrap();
        app.close();

        let header = std::fs::read(config.database_path()).unwrap();
        assert!(header.starts_with(b"SQLite format 3\0"));
    }
}
