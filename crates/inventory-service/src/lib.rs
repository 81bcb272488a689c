//! Inventory application services
//!
//! Sits between a UI shell and [`inventory_storage_sqlite`]: the items
//! repository, the item details and settings view states, form validation,
//! configuration, and the [`InventoryApp`] container that wires them up.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod error;
pub mod item_details;
pub mod repository;
pub mod settings_view;
pub mod validation;

pub use app::{default_keystore, InventoryApp, KEYRING_SERVICE};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use item_details::{
    build_share_text, ItemDetails, ItemDetailsContext, ItemDetailsUiState, ItemDetailsViewState,
    REDACTED,
};
pub use repository::{ItemListStream, ItemStream, ItemsRepository, OfflineItemsRepository};
pub use settings_view::SettingsViewState;
pub use validation::{check_email, check_phone_number, validate_contact, ValidationErrors};
