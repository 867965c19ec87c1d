pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;

pub use crate::config::{EventsConfig, GraphConfig, LoggingConfig};
pub use error::*;
pub use store::{ChangeSet, ChangedRecord, FieldValue, RecordKind, RecordRef, RecordStore};
pub use types::*;
