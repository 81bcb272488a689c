//! Item persistence with change-driven query streams
//!
//! Every committed write bumps a version counter held in a `watch` channel.
//! A stream emits its query result immediately on subscription, then re-runs
//! the query each time the counter moves. Bursts of writes between two polls
//! collapse into a single emission. Streams end once the store is closed.

use crate::database::Database;
use crate::encryption::EncryptionKey;
use crate::models::Item;
use crate::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

const SELECT_ITEM: &str = "SELECT id, name, price, quantity, supplier_name, supplier_email, \
                           supplier_phone FROM Item";

/// Stream of a single item (`None` while the row does not exist)
pub type ItemStream = BoxStream<'static, Result<Option<Item>>>;

/// Stream of every item ordered by name
pub type ItemListStream = BoxStream<'static, Result<Vec<Item>>>;

struct Inner {
    db: Mutex<Option<Database>>,
    changes: Mutex<Option<watch::Sender<u64>>>,
}

impl Inner {
    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let guard = self.db.lock();
        let db = guard.as_ref().ok_or(Error::Closed)?;
        f(db)
    }

    fn notify(&self) {
        if let Some(tx) = self.changes.lock().as_ref() {
            tx.send_modify(|version| *version = version.wrapping_add(1));
        }
    }

    fn subscribe(&self) -> Result<watch::Receiver<u64>> {
        self.changes
            .lock()
            .as_ref()
            .map(watch::Sender::subscribe)
            .ok_or(Error::Closed)
    }
}

/// Inventory item store. Clones share the same connection and change feed.
#[derive(Clone)]
pub struct ItemStore {
    inner: Arc<Inner>,
}

impl ItemStore {
    /// Open the store at `path`, encrypted when a key is given
    pub fn open<P: AsRef<Path>>(path: P, key: Option<&EncryptionKey>) -> Result<Self> {
        Ok(Self::from_database(Database::open(path, key)?))
    }

    /// Unencrypted in-memory store
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    /// Wrap an already opened database
    pub fn from_database(db: Database) -> Self {
        let (tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                db: Mutex::new(Some(db)),
                changes: Mutex::new(Some(tx)),
            }),
        }
    }

    /// Insert an item and return its new ID. Any `id` on the input is ignored.
    pub fn insert(&self, item: &Item) -> Result<i64> {
        item.validate()?;
        let id = self.inner.with_db(|db| {
            db.conn()
                .execute(
                    "INSERT INTO Item
                     (name, price, quantity, supplier_name, supplier_email, supplier_phone)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        item.name,
                        item.price,
                        item.quantity,
                        item.supplier_name,
                        item.supplier_email,
                        item.supplier_phone,
                    ],
                )
                .map_err(Error::from_write)?;
            Ok(db.conn().last_insert_rowid())
        })?;

        tracing::debug!(id, "Inserted item");
        self.inner.notify();
        Ok(id)
    }

    /// Replace the row matching `item.id`. Returns false (and changes nothing)
    /// when there is no such row.
    pub fn update(&self, item: &Item) -> Result<bool> {
        let Some(id) = item.id else {
            tracing::debug!("Update of an item without ID ignored");
            return Ok(false);
        };
        item.validate()?;

        let changed = self.inner.with_db(|db| {
            db.conn()
                .execute(
                    "UPDATE Item SET name = ?2, price = ?3, quantity = ?4,
                         supplier_name = ?5, supplier_email = ?6, supplier_phone = ?7
                     WHERE id = ?1",
                    params![
                        id,
                        item.name,
                        item.price,
                        item.quantity,
                        item.supplier_name,
                        item.supplier_email,
                        item.supplier_phone,
                    ],
                )
                .map_err(Error::from_write)
        })?;

        self.after_write("update", id, changed)
    }

    /// Remove the row matching `item.id`
    pub fn delete(&self, item: &Item) -> Result<bool> {
        match item.id {
            Some(id) => self.delete_by_id(id),
            None => {
                tracing::debug!("Delete of an item without ID ignored");
                Ok(false)
            }
        }
    }

    /// Remove the row with `id`
    pub fn delete_by_id(&self, id: i64) -> Result<bool> {
        let changed = self.inner.with_db(|db| {
            db.conn()
                .execute("DELETE FROM Item WHERE id = ?1", [id])
                .map_err(Error::from_write)
        })?;
        self.after_write("delete", id, changed)
    }

    /// Decrement the stock of `id` by one unless it is already zero.
    ///
    /// Single conditional UPDATE, so concurrent callers can never drive the
    /// quantity below zero. Returns whether a unit was removed.
    pub fn decrement_quantity(&self, id: i64) -> Result<bool> {
        let changed = self.inner.with_db(|db| {
            db.conn()
                .execute(
                    "UPDATE Item SET quantity = quantity - 1 WHERE id = ?1 AND quantity > 0",
                    [id],
                )
                .map_err(Error::from_write)
        })?;
        self.after_write("decrement", id, changed)
    }

    /// Current value of one item
    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        self.inner.with_db(|db| query_item(db, id))
    }

    /// Current items ordered by name
    pub fn get_all_items(&self) -> Result<Vec<Item>> {
        self.inner.with_db(query_all)
    }

    /// Number of stored items
    pub fn count(&self) -> Result<i64> {
        self.inner.with_db(|db| {
            Ok(db
                .conn()
                .query_row("SELECT COUNT(*) FROM Item", [], |row| row.get(0))?)
        })
    }

    /// Stream of the item with `id`: current value first, then one emission per change
    pub fn item_stream(&self, id: i64) -> Result<ItemStream> {
        tracing::debug!(id, "Subscribing to item");
        self.watch_query(move |db| query_item(db, id))
    }

    /// Stream of all items ordered by name: current list first, then one emission per change
    pub fn all_items_stream(&self) -> Result<ItemListStream> {
        tracing::debug!("Subscribing to item list");
        self.watch_query(query_all)
    }

    /// Close the store. Pending streams end; further calls fail with [`Error::Closed`].
    pub fn close(&self) {
        self.inner.changes.lock().take();
        if self.inner.db.lock().take().is_some() {
            tracing::debug!("Closed item store");
        }
    }

    /// Whether [`ItemStore::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.inner.db.lock().is_none()
    }

    fn after_write(&self, op: &str, id: i64, changed: usize) -> Result<bool> {
        if changed == 0 {
            tracing::debug!(id, op, "No matching item, nothing written");
            return Ok(false);
        }
        tracing::debug!(id, op, "Item written");
        self.inner.notify();
        Ok(true)
    }

    fn watch_query<T, F>(&self, query: F) -> Result<BoxStream<'static, Result<T>>>
    where
        T: Send + 'static,
        F: Fn(&Database) -> Result<T> + Send + Sync + 'static,
    {
        let rx = self.inner.subscribe()?;
        let state = (Arc::clone(&self.inner), rx, Arc::new(query), true);

        Ok(stream::unfold(state, |(inner, mut rx, query, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }

            let task_inner = Arc::clone(&inner);
            let task_query = Arc::clone(&query);
            let value = tokio::task::spawn_blocking(move || task_inner.with_db(|db| task_query(db)))
                .await
                .unwrap_or_else(|e| Err(Error::Task(e.to_string())));

            if matches!(value, Err(Error::Closed)) {
                return None;
            }
            Some((value, (inner, rx, query, false)))
        })
        .boxed())
    }
}

fn query_item(db: &Database, id: i64) -> Result<Option<Item>> {
    let item = db
        .conn()
        .query_row(&format!("{} WHERE id = ?1", SELECT_ITEM), [id], Item::from_row)
        .optional()?;
    Ok(item)
}

fn query_all(db: &Database) -> Result<Vec<Item>> {
    let mut stmt = db
        .conn()
        .prepare_cached(&format!("{} ORDER BY name ASC, id ASC", SELECT_ITEM))?;
    let items = stmt
        .query_map([], Item::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bolt() -> Item {
        Item::new("Bolt", 0.15, 40).with_supplier("Acme", "orders@acme.io", "+15550100")
    }

    #[test]
    fn test_insert_then_get() {
        let store = ItemStore::in_memory().unwrap();
        let id = store.insert(&bolt()).unwrap();

        let stored = store.get_item(id).unwrap().unwrap();
        assert_eq!(stored, Item { id: Some(id), ..bolt() });
    }

    #[test]
    fn test_insert_rejects_negative_quantity() {
        let store = ItemStore::in_memory().unwrap();
        let err = store.insert(&Item::new("Bolt", 1.0, -3)).unwrap_err();

        assert!(matches!(err, Error::ConstraintViolation(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_update_and_delete_missing_are_noops() {
        let store = ItemStore::in_memory().unwrap();
        let ghost = Item { id: Some(99), ..bolt() };

        assert!(!store.update(&ghost).unwrap());
        assert!(!store.delete(&ghost).unwrap());
        assert!(!store.update(&bolt()).unwrap());
    }

    #[test]
    fn test_decrement_stops_at_zero() {
        let store = ItemStore::in_memory().unwrap();
        let id = store.insert(&Item::new("Washer", 0.05, 1)).unwrap();

        assert!(store.decrement_quantity(id).unwrap());
        assert!(!store.decrement_quantity(id).unwrap());
        assert_eq!(store.get_item(id).unwrap().unwrap().quantity, 0);
    }

    #[test]
    fn test_all_items_sorted_by_name() {
        let store = ItemStore::in_memory().unwrap();
        store.insert(&Item::new("Washer", 0.05, 1)).unwrap();
        store.insert(&Item::new("Anchor", 2.0, 5)).unwrap();
        store.insert(&Item::new("Nut", 0.1, 9)).unwrap();

        let names: Vec<_> = store
            .get_all_items()
            .unwrap()
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, ["Anchor", "Nut", "Washer"]);
    }

    #[test]
    fn test_closed_store_rejects_calls() {
        let store = ItemStore::in_memory().unwrap();
        store.close();

        assert!(store.is_closed());
        assert!(matches!(store.count(), Err(Error::Closed)));
        assert!(matches!(store.item_stream(1), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_item_stream_replays_then_follows_changes() {
        let store = ItemStore::in_memory().unwrap();
        let id = store.insert(&bolt()).unwrap();
        let mut stream = store.item_stream(id).unwrap();

        let first = stream.next().await.unwrap().unwrap().unwrap();
        assert_eq!(first.quantity, 40);

        store.decrement_quantity(id).unwrap();
        let second = stream.next().await.unwrap().unwrap().unwrap();
        assert_eq!(second.quantity, 39);

        store.delete_by_id(id).unwrap();
        assert!(stream.next().await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_for_missing_item_emits_none() {
        let store = ItemStore::in_memory().unwrap();
        let mut stream = store.item_stream(7).unwrap();

        assert!(stream.next().await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_ends_on_close() {
        let store = ItemStore::in_memory().unwrap();
        let mut stream = store.all_items_stream().unwrap();

        assert!(stream.next().await.unwrap().unwrap().is_empty());
        store.close();
        assert!(stream.next().await.is_none());
    }
}
