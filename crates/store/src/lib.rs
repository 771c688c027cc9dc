//! Embedded key/value persistence.
//! - `Database` is the facade applications construct.
//! - Backing stores implement `StorageAdaptor`: a JSON file (`FileAdaptor`) or
//!   a SQL table (`RelationalAdaptor`).
//! - Errors share one taxonomy, `StoreError`.

pub mod errors;
pub mod adaptor;
pub mod coerce;
pub mod file;
pub mod relational;
pub mod database;

pub use adaptor::{AdaptorFactory, AdaptorOptions, CacheMirror, Entries, PersistSource, StorageAdaptor};
pub use database::{CacheMode, Database, DatabaseBuilder, TRANSFER_MESSAGE};
pub use errors::StoreError;
pub use file::{FileAdaptor, FileAdaptorFactory};
pub use relational::{ConnectSettings, RelationalAdaptor, RelationalAdaptorFactory};
