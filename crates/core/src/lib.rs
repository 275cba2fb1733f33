pub mod config;
pub mod error;
pub mod field_value;
pub mod fields;
pub mod ids;
pub mod intent;
pub mod object;
pub mod predicate;
pub mod schema;
pub mod selector;

pub use config::{PolicyKind, RecordLabels, SyncConfig};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use fields::{FieldKey, FieldMap, RelationEdit};
pub use ids::*;
pub use intent::SyncIntent;
pub use object::TargetObject;
pub use predicate::Predicate;
pub use schema::{Attribute, Cardinality, EntitySchema, FieldDef, FieldKind, RelationDef, SchemaRegistry};
pub use selector::{MatchSpec, MatchToken, ObjectSelector};
