use tracing::warn;

use crate::error::StorageError;
use crate::traits::ObjectStore;

/// Scope guard over a store transaction. Dropping it without calling
/// [`StoreTransaction::commit`] rolls the transaction back.
pub struct StoreTransaction<'a> {
    store: &'a mut dyn ObjectStore,
    finished: bool,
}

impl<'a> StoreTransaction<'a> {
    pub fn begin(store: &'a mut dyn ObjectStore) -> Result<Self, StorageError> {
        store.begin()?;
        Ok(Self {
            store,
            finished: false,
        })
    }

    pub fn store(&mut self) -> &mut (dyn ObjectStore + 'a) {
        &mut *self.store
    }

    /// A failed commit leaves the guard armed, so the drop still rolls back.
    pub fn commit(mut self) -> Result<(), StorageError> {
        self.store.commit()?;
        self.finished = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), StorageError> {
        self.finished = true;
        self.store.rollback()
    }
}

impl Drop for StoreTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.store.rollback() {
                warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}
