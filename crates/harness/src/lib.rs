pub mod fixtures;
pub mod logging;

pub use fixtures::*;
