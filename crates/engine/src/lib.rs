pub mod actions;
pub mod error;
pub mod factory;
pub mod policy;
pub mod sync;

pub use actions::{ActionType, SyncAction};
pub use error::EngineError;
pub use factory::ActionFactory;
pub use policy::{BasicSyncPolicy, OrderedSyncPolicy, SyncPolicy, TransactionSyncPolicy};
pub use sync::{BatchSummary, SyncSource, Synchronizer};
