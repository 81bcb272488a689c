//! Item details view state
//!
//! Projects one item's change stream into [`ItemDetailsUiState`] and exposes
//! the screen's actions. The upstream subscription starts with the first
//! observer and is dropped once no observer has been attached for the
//! configured linger window.

use crate::repository::ItemsRepository;
use crate::{Error, Result};
use futures::StreamExt;
use inventory_storage_sqlite::{EncryptedFile, Item, MasterKey, SettingsStore};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Placeholder shown in shared text instead of redacted supplier details
pub const REDACTED: &str = " -";

/// Item fields as shown and edited on screen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDetails {
    /// Item ID, 0 before anything is loaded
    pub id: i64,
    /// Name
    pub name: String,
    /// Price as entered
    pub price: String,
    /// Quantity as entered
    pub quantity: String,
    /// Supplier name
    pub supplier_name: String,
    /// Supplier email
    pub supplier_email: String,
    /// Supplier phone
    pub supplier_phone: String,
}

impl ItemDetails {
    /// Screen fields for a stored item
    pub fn from_item(item: &Item) -> Self {
        Self {
            id: item.id.unwrap_or_default(),
            name: item.name.clone(),
            price: plain_price(item.price),
            quantity: item.quantity.to_string(),
            supplier_name: item.supplier_name.clone(),
            supplier_email: item.supplier_email.clone(),
            supplier_phone: item.supplier_phone.clone(),
        }
    }

    /// Item for these fields; unparsable numbers become zero
    pub fn to_item(&self) -> Item {
        Item {
            id: (self.id != 0).then_some(self.id),
            name: self.name.clone(),
            price: self.price.trim().parse().unwrap_or(0.0),
            quantity: self.quantity.trim().parse().unwrap_or(0),
            supplier_name: self.supplier_name.clone(),
            supplier_email: self.supplier_email.clone(),
            supplier_phone: self.supplier_phone.clone(),
        }
    }

    /// Price with a currency sign and two decimals
    pub fn formatted_price(&self) -> String {
        format!("${:.2}", self.price.trim().parse::<f64>().unwrap_or(0.0))
    }
}

/// UI state of the item details screen
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDetailsUiState {
    /// No units left (also true before the first load)
    pub out_of_stock: bool,
    /// Displayed fields
    pub item_details: ItemDetails,
}

impl Default for ItemDetailsUiState {
    fn default() -> Self {
        Self {
            out_of_stock: true,
            item_details: ItemDetails::default(),
        }
    }
}

impl ItemDetailsUiState {
    /// State derived from one emission of the item stream
    pub fn from_item(item: &Item) -> Self {
        Self {
            out_of_stock: item.is_out_of_stock(),
            item_details: ItemDetails::from_item(item),
        }
    }

    /// Whether an item has been loaded yet
    pub fn is_loaded(&self) -> bool {
        self.item_details.id != 0
    }
}

/// Share text for `item`, with supplier email and phone replaced by
/// [`REDACTED`] when `hide_sensitive_data` is set.
pub fn build_share_text(item: &Item, hide_sensitive_data: bool) -> String {
    let (email, phone) = if hide_sensitive_data {
        (REDACTED, REDACTED)
    } else {
        (item.supplier_email.as_str(), item.supplier_phone.as_str())
    };

    format!(
        "Item Details:\nName: {}\nPrice: {}\nQuantity: {}\n\
         Supplier Name: {}\nSupplier Email: {}\nSupplier Phone: {}",
        item.name,
        plain_price(item.price),
        item.quantity,
        item.supplier_name,
        email,
        phone,
    )
}

fn plain_price(price: f64) -> String {
    if price.fract() == 0.0 && price.abs() < 1e15 {
        format!("{:.1}", price)
    } else {
        price.to_string()
    }
}

/// Everything [`ItemDetailsViewState`] needs besides the repository
pub struct ItemDetailsContext {
    /// Settings read when sharing
    pub settings: Arc<SettingsStore>,
    /// Key export files are encrypted under
    pub master_key: MasterKey,
    /// Directory holding the intermediate file of each export
    pub export_temp_dir: PathBuf,
    /// How long the upstream subscription outlives the last observer
    pub linger: Duration,
}

/// View state for a single item
pub struct ItemDetailsViewState {
    item_id: i64,
    repository: Arc<dyn ItemsRepository>,
    context: ItemDetailsContext,
    state: Arc<watch::Sender<ItemDetailsUiState>>,
    collecting: Arc<Mutex<bool>>,
}

impl ItemDetailsViewState {
    /// Create the view state; nothing is read until [`Self::subscribe`]
    pub fn new(
        item_id: i64,
        repository: Arc<dyn ItemsRepository>,
        context: ItemDetailsContext,
    ) -> Self {
        let (state, _) = watch::channel(ItemDetailsUiState::default());
        Self {
            item_id,
            repository,
            context,
            state: Arc::new(state),
            collecting: Arc::new(Mutex::new(false)),
        }
    }

    /// ID of the item this screen shows
    pub fn item_id(&self) -> i64 {
        self.item_id
    }

    /// Observe the UI state. Must be called inside a Tokio runtime.
    pub fn subscribe(&self) -> Result<watch::Receiver<ItemDetailsUiState>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Task(format!("no async runtime: {}", e)))?;

        let mut collecting = self.collecting.lock();
        let rx = self.state.subscribe();
        if !*collecting {
            *collecting = true;
            runtime.spawn(collect(
                self.item_id,
                Arc::clone(&self.repository),
                Arc::clone(&self.state),
                Arc::clone(&self.collecting),
                self.context.linger,
            ));
        }
        Ok(rx)
    }

    /// Latest UI state
    pub fn ui_state(&self) -> ItemDetailsUiState {
        self.state.borrow().clone()
    }

    /// Whether the upstream item subscription is currently active
    pub fn is_collecting(&self) -> bool {
        *self.collecting.lock()
    }

    /// Remove one unit of stock unless already at zero.
    ///
    /// Issued as one conditional update, so the quantity never goes negative
    /// even with concurrent writers. Returns whether a unit was removed.
    pub async fn reduce_quantity_by_one(&self) -> Result<bool> {
        self.repository.reduce_quantity_by_one(self.item_id).await
    }

    /// Delete the item shown on this screen
    pub async fn delete_item(&self) -> Result<()> {
        let mut item = self.ui_state().item_details.to_item();
        item.id = Some(self.item_id);
        self.repository.delete_item(item).await
    }

    /// Share text for the current item, or `None` while sharing is disabled
    pub async fn share(&self) -> Result<Option<String>> {
        let settings = Arc::clone(&self.context.settings);
        let (enabled, hide) = tokio::task::spawn_blocking(move || {
            Ok::<_, Error>((settings.enable_sharing()?, settings.hide_sensitive_data()?))
        })
        .await??;

        if !enabled {
            tracing::debug!(id = self.item_id, "Sharing disabled, nothing to share");
            return Ok(None);
        }
        let item = self.loaded_item().await?;
        Ok(Some(build_share_text(&item, hide)))
    }

    /// Share text honouring the hide-sensitive-data setting
    pub fn build_share_text(&self, item: &Item) -> Result<String> {
        Ok(build_share_text(item, self.context.settings.hide_sensitive_data()?))
    }

    /// Export the current item as encrypted JSON to `destination`.
    ///
    /// The JSON is first encrypted into a temporary file of its own under the
    /// export directory, then its bytes are copied to `destination`. The
    /// temporary file is removed on every exit path, and concurrent exports
    /// never share one.
    pub async fn save_to_file(&self, destination: impl Into<PathBuf>) -> Result<()> {
        let destination = destination.into();
        let item = self.loaded_item().await?;
        let json = serde_json::to_vec(&item).map_err(inventory_storage_sqlite::Error::from)?;
        let temp_dir = self.context.export_temp_dir.clone();
        let master_key = self.context.master_key.clone();

        tokio::task::spawn_blocking(move || {
            export_encrypted(&json, &temp_dir, &destination, &master_key)
        })
        .await??;

        tracing::info!(id = self.item_id, "Exported item");
        Ok(())
    }

    async fn loaded_item(&self) -> Result<Item> {
        let state = self.ui_state();
        if state.is_loaded() {
            let mut item = state.item_details.to_item();
            item.id = Some(self.item_id);
            return Ok(item);
        }
        self.repository
            .get_item(self.item_id)
            .await?
            .ok_or(Error::NotFound(self.item_id))
    }
}

async fn collect(
    item_id: i64,
    repository: Arc<dyn ItemsRepository>,
    state: Arc<watch::Sender<ItemDetailsUiState>>,
    collecting: Arc<Mutex<bool>>,
    linger: Duration,
) {
    let mut upstream = match repository.get_item_stream(item_id) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(id = item_id, error = %e, "Cannot subscribe to item");
            *collecting.lock() = false;
            return;
        }
    };
    tracing::debug!(id = item_id, "Item subscription started");

    loop {
        tokio::select! {
            next = upstream.next() => match next {
                Some(Ok(Some(item))) => {
                    state.send_replace(ItemDetailsUiState::from_item(&item));
                }
                // Absent rows keep the last shown details.
                Some(Ok(None)) => {}
                Some(Err(e)) => {
                    tracing::warn!(id = item_id, error = %e, "Item stream error");
                }
                None => {
                    *collecting.lock() = false;
                    break;
                }
            },
            _ = state.closed() => {
                tokio::time::sleep(linger).await;
                let mut running = collecting.lock();
                if state.receiver_count() == 0 {
                    *running = false;
                    break;
                }
            }
        }
    }
    tracing::debug!(id = item_id, "Item subscription stopped");
}

fn export_encrypted(
    json: &[u8],
    temp_dir: &Path,
    destination: &Path,
    master_key: &MasterKey,
) -> Result<()> {
    std::fs::create_dir_all(temp_dir)?;

    // Unique per export; deleted when dropped, on success, error or panic.
    let temp = tempfile::Builder::new()
        .prefix("temp")
        .suffix(".json")
        .tempfile_in(temp_dir)?;
    tracing::debug!(path = %temp.path().display(), "Encrypting export");

    let encrypted = EncryptedFile::new(temp.path(), master_key);
    let mut writer = encrypted.output_to(temp.reopen()?)?;
    writer.write_all(json)?;
    writer.finish()?;

    let mut source = temp.reopen()?;
    let mut target = std::fs::File::create(destination)?;
    std::io::copy(&mut source, &mut target)?;
    target.sync_all()?;
    Ok(())
}
