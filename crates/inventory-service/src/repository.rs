//! Items repository: the seam between view states and storage

use crate::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use inventory_storage_sqlite::{Item, ItemStore};

/// Stream of one item; `None` while it does not exist
pub type ItemStream = BoxStream<'static, Result<Option<Item>>>;

/// Stream of every item ordered by name
pub type ItemListStream = BoxStream<'static, Result<Vec<Item>>>;

/// Domain-shaped access to stored items
#[async_trait]
pub trait ItemsRepository: Send + Sync {
    /// All items, re-emitted on every change
    fn get_all_items_stream(&self) -> Result<ItemListStream>;

    /// One item, re-emitted on every change
    fn get_item_stream(&self, id: i64) -> Result<ItemStream>;

    /// Current value of one item
    async fn get_item(&self, id: i64) -> Result<Option<Item>>;

    /// Insert an item, returning its new ID
    async fn insert_item(&self, item: Item) -> Result<i64>;

    /// Replace an item by ID; silently ignored when the ID is unknown
    async fn update_item(&self, item: Item) -> Result<()>;

    /// Delete an item by ID; silently ignored when the ID is unknown
    async fn delete_item(&self, item: Item) -> Result<()>;

    /// Remove one unit of stock unless already at zero. Returns whether a unit was removed.
    async fn reduce_quantity_by_one(&self, id: i64) -> Result<bool>;
}

/// Repository backed by the local [`ItemStore`]
#[derive(Clone)]
pub struct OfflineItemsRepository {
    store: ItemStore,
}

impl OfflineItemsRepository {
    /// Wrap a store
    pub fn new(store: ItemStore) -> Self {
        Self { store }
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ItemStore) -> inventory_storage_sqlite::Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        let value = tokio::task::spawn_blocking(move || f(&store)).await??;
        Ok(value)
    }
}

#[async_trait]
impl ItemsRepository for OfflineItemsRepository {
    fn get_all_items_stream(&self) -> Result<ItemListStream> {
        Ok(self
            .store
            .all_items_stream()?
            .map(|r| r.map_err(crate::Error::from))
            .boxed())
    }

    fn get_item_stream(&self, id: i64) -> Result<ItemStream> {
        Ok(self
            .store
            .item_stream(id)?
            .map(|r| r.map_err(crate::Error::from))
            .boxed())
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        self.run_blocking(move |store| store.get_item(id)).await
    }

    async fn insert_item(&self, item: Item) -> Result<i64> {
        self.run_blocking(move |store| store.insert(&item)).await
    }

    async fn update_item(&self, item: Item) -> Result<()> {
        self.run_blocking(move |store| store.update(&item).map(|_| ()))
            .await
    }

    async fn delete_item(&self, item: Item) -> Result<()> {
        self.run_blocking(move |store| store.delete(&item).map(|_| ()))
            .await
    }

    async fn reduce_quantity_by_one(&self, id: i64) -> Result<bool> {
        self.run_blocking(move |store| store.decrement_quantity(id))
            .await
    }
}
