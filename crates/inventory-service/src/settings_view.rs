//! Settings form view state

use crate::validation::{check_email, check_phone_number, validate_contact, ValidationErrors};
use crate::Result;
use inventory_storage_sqlite::{SettingsRecord, SettingsStore};
use std::sync::Arc;
use tokio::sync::watch;

/// Editable copy of the settings, saved back on [`SettingsViewState::save`]
pub struct SettingsViewState {
    settings: Arc<SettingsStore>,
    state: watch::Sender<SettingsRecord>,
}

impl SettingsViewState {
    /// Load the stored settings into the form
    pub fn new(settings: Arc<SettingsStore>) -> Result<Self> {
        let record = settings.load()?;
        let (state, _) = watch::channel(record);
        Ok(Self { settings, state })
    }

    /// Discard edits and reload from the store
    pub fn reload(&self) -> Result<()> {
        self.state.send_replace(self.settings.load()?);
        Ok(())
    }

    /// Observe the form
    pub fn subscribe(&self) -> watch::Receiver<SettingsRecord> {
        self.state.subscribe()
    }

    /// Current form contents
    pub fn ui_state(&self) -> SettingsRecord {
        self.state.borrow().clone()
    }

    fn edit(&self, f: impl FnOnce(&mut SettingsRecord)) {
        self.state.send_modify(f);
    }

    /// Default supplier name edited
    pub fn on_name_change(&self, name: impl Into<String>) {
        let name = name.into();
        self.edit(|s| s.default_shipper_name = name);
    }

    /// Default supplier email edited
    pub fn on_email_change(&self, email: impl Into<String>) {
        let email = email.into();
        self.edit(|s| s.default_shipper_email = email);
    }

    /// Default supplier phone edited
    pub fn on_phone_change(&self, phone: impl Into<String>) {
        let phone = phone.into();
        self.edit(|s| s.default_shipper_phone = phone);
    }

    /// Prefill toggle changed
    pub fn on_enable_default_fields_change(&self, enabled: bool) {
        self.edit(|s| s.enable_default_fields = enabled);
    }

    /// Redaction toggle changed
    pub fn on_hide_sensitive_data_change(&self, hide: bool) {
        self.edit(|s| s.hide_sensitive_data = hide);
    }

    /// Sharing toggle changed
    pub fn on_enable_sharing_change(&self, enabled: bool) {
        self.edit(|s| s.enable_sharing = enabled);
    }

    /// Whether the email and phone on the form are both well formed
    pub fn is_valid_settings(&self) -> bool {
        let state = self.state.borrow();
        check_email(&state.default_shipper_email)
            && check_phone_number(&state.default_shipper_phone)
    }

    /// Per-field problems with the current form
    pub fn validation_errors(&self) -> ValidationErrors {
        let state = self.state.borrow();
        validate_contact(&state.default_shipper_email, &state.default_shipper_phone)
    }

    /// Write all six fields. Nothing is written when validation fails.
    pub async fn save(&self) -> Result<()> {
        self.validation_errors().into_result()?;

        let record = self.ui_state();
        let settings = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || settings.save(&record)).await??;

        tracing::info!("Settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use inventory_storage_sqlite::{MasterKey, SettingsField};

    fn store(dir: &tempfile::TempDir, key: &MasterKey) -> Arc<SettingsStore> {
        Arc::new(SettingsStore::init(dir.path().join("prefs.json"), key).unwrap())
    }

    #[tokio::test]
    async fn test_save_writes_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::generate();
        let view = SettingsViewState::new(store(&dir, &key)).unwrap();

        view.on_name_change("Acme");
        view.on_email_change("orders@acme.example");
        view.on_phone_change("+4420123");
        view.on_enable_default_fields_change(true);
        view.on_hide_sensitive_data_change(true);
        view.on_enable_sharing_change(true);
        view.save().await.unwrap();

        let reopened = store(&dir, &key).load().unwrap();
        assert_eq!(reopened, view.ui_state());
        assert!(reopened.enable_sharing);
    }

    #[tokio::test]
    async fn test_invalid_form_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::generate();
        let settings = store(&dir, &key);
        let view = SettingsViewState::new(Arc::clone(&settings)).unwrap();

        view.on_name_change("Acme");
        view.on_email_change("acme");
        view.on_phone_change("12345");
        assert!(!view.is_valid_settings());

        match view.save().await {
            Err(Error::Validation(errors)) => {
                assert!(errors.for_field(SettingsField::DefaultShipperEmail).is_some());
                assert!(errors.for_field(SettingsField::DefaultShipperPhone).is_none());
            }
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(settings.default_shipper_name().unwrap(), "");
    }

    #[test]
    fn test_setters_notify_observers() {
        let dir = tempfile::tempdir().unwrap();
        let view = SettingsViewState::new(store(&dir, &MasterKey::generate())).unwrap();
        let mut rx = view.subscribe();
        rx.borrow_and_update();

        view.on_hide_sensitive_data_change(true);

        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow().hide_sensitive_data);
    }

    #[test]
    fn test_reload_discards_edits() {
        let dir = tempfile::tempdir().unwrap();
        let view = SettingsViewState::new(store(&dir, &MasterKey::generate())).unwrap();

        view.on_email_change("draft@x.io");
        view.reload().unwrap();

        assert_eq!(view.ui_state(), SettingsRecord::default());
    }
}
