pub mod error;
mod query;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod transaction;

pub use error::StorageError;
pub use sqlite::SqliteStore;
pub use traits::*;
pub use transaction::StoreTransaction;
