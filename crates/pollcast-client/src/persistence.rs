//! Persisted client state.
//!
//! The notification log and the dedup cache are two blobs in the same storage
//! domain and are always written together.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use sled::{Batch, Db, Tree};

use crate::error::Error;

/// Key of the notification log blob.
pub const NOTIFICATIONS_KEY: &[u8] = b"notifications";

/// Key of the dedup cache blob.
pub const DEDUP_CACHE_KEY: &[u8] = b"notification_state_cache";

/// Tree holding client state.
pub const STATE_TREE: &str = "pollcast_client_state";

/// Raw persisted blobs. `None` means the blob was never written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedBlobs {
    pub notifications: Option<Vec<u8>>,
    pub dedup_cache: Option<Vec<u8>>,
}

/// Storage backend for client state.
pub trait StateStorage: Send + Sync {
    /// Read both blobs.
    fn load(&self) -> Result<PersistedBlobs, Error>;

    /// Write both blobs atomically.
    fn save(&self, notifications: &[u8], dedup_cache: &[u8]) -> Result<(), Error>;
}

/// State stored in a sled tree.
pub struct SledStorage {
    _db: Db,
    tree: Tree,
}

impl SledStorage {
    /// Open (or create) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open a temporary database removed on drop.
    pub fn temporary() -> Result<Self, Error> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Use the state tree of an existing database.
    pub fn from_db(db: Db) -> Result<Self, Error> {
        let tree = db.open_tree(STATE_TREE)?;
        Ok(Self { _db: db, tree })
    }

    /// Underlying tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }
}

impl StateStorage for SledStorage {
    fn load(&self) -> Result<PersistedBlobs, Error> {
        Ok(PersistedBlobs {
            notifications: self.tree.get(NOTIFICATIONS_KEY)?.map(|v| v.to_vec()),
            dedup_cache: self.tree.get(DEDUP_CACHE_KEY)?.map(|v| v.to_vec()),
        })
    }

    fn save(&self, notifications: &[u8], dedup_cache: &[u8]) -> Result<(), Error> {
        let mut batch = Batch::default();
        batch.insert(NOTIFICATIONS_KEY, notifications);
        batch.insert(DEDUP_CACHE_KEY, dedup_cache);
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        Ok(())
    }
}

/// State kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<PersistedBlobs>,
    failing: AtomicBool,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage preloaded with `blobs`.
    pub fn with_blobs(blobs: PersistedBlobs) -> Self {
        Self {
            blobs: Mutex::new(blobs),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Current blobs.
    pub fn blobs(&self) -> PersistedBlobs {
        self.blobs.lock().clone()
    }

    fn check(&self) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Persistence("storage unavailable".into()));
        }
        Ok(())
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self) -> Result<PersistedBlobs, Error> {
        self.check()?;
        Ok(self.blobs.lock().clone())
    }

    fn save(&self, notifications: &[u8], dedup_cache: &[u8]) -> Result<(), Error> {
        self.check()?;
        *self.blobs.lock() = PersistedBlobs {
            notifications: Some(notifications.to_vec()),
            dedup_cache: Some(dedup_cache.to_vec()),
        };
        Ok(())
    }
}
