use tracing::{debug, warn};

use recsync_storage::{ObjectStore, StoreTransaction};

use crate::actions::{ActionType, SyncAction};
use crate::error::EngineError;

pub trait SyncPolicy: std::fmt::Debug {
    fn execute(&self, store: &mut dyn ObjectStore) -> Result<(), EngineError>;

    /// Number of actions this policy will consider.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run every action in input order.
#[derive(Debug, Default)]
pub struct BasicSyncPolicy {
    actions: Vec<Box<dyn SyncAction>>,
}

impl BasicSyncPolicy {
    pub fn new(actions: Vec<Box<dyn SyncAction>>) -> Self {
        Self { actions }
    }
}

impl SyncPolicy for BasicSyncPolicy {
    fn execute(&self, store: &mut dyn ObjectStore) -> Result<(), EngineError> {
        for action in &self.actions {
            action.execute(store)?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.actions.len()
    }
}

/// All creates, then all updates, then all deletes. Input order is kept
/// within each group, and impotent actions are never run.
///
/// A delete listed before a create for the same object therefore cannot
/// undo the create, and updates may refer to objects created later in the
/// input.
#[derive(Debug, Default)]
pub struct OrderedSyncPolicy {
    actions: Vec<Box<dyn SyncAction>>,
}

impl OrderedSyncPolicy {
    const ORDER: [ActionType; 3] = [ActionType::Create, ActionType::Update, ActionType::Delete];

    pub fn new(actions: Vec<Box<dyn SyncAction>>) -> Self {
        Self { actions }
    }
}

impl SyncPolicy for OrderedSyncPolicy {
    fn execute(&self, store: &mut dyn ObjectStore) -> Result<(), EngineError> {
        for action_type in Self::ORDER {
            let mut executed = 0usize;
            for action in self.actions.iter().filter(|a| a.action_type() == action_type) {
                action.execute(store)?;
                executed += 1;
            }
            debug!(%action_type, executed, "executed action group");
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.actions.len()
    }
}

/// Runs the wrapped policy inside one store transaction. Any error escaping
/// the policy rolls the whole batch back.
#[derive(Debug)]
pub struct TransactionSyncPolicy {
    policy: Box<dyn SyncPolicy>,
}

impl TransactionSyncPolicy {
    pub fn new(policy: Box<dyn SyncPolicy>) -> Self {
        Self { policy }
    }
}

impl SyncPolicy for TransactionSyncPolicy {
    fn execute(&self, store: &mut dyn ObjectStore) -> Result<(), EngineError> {
        let mut tx = StoreTransaction::begin(store)?;

        match self.policy.execute(tx.store()) {
            Ok(()) => {
                tx.commit()?;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "batch failed, rolling back");
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn len(&self) -> usize {
        self.policy.len()
    }
}
