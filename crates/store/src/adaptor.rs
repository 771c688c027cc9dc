use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::RwLock;

use crate::errors::{json_type_name, StoreError};

/// A store's full key/value mapping, in insertion order.
pub type Entries = Map<String, Value>;

/// Facade-owned cache that an adaptor may be asked to persist instead of its own state.
pub type CacheMirror = Arc<RwLock<Entries>>;

/// What an adaptor writes to its backing store on every mutation.
#[derive(Clone, Default)]
pub enum PersistSource {
    /// The adaptor's own in-memory mapping.
    #[default]
    OwnState,
    /// An externally owned mapping; hydration leaves the adaptor's mapping alone.
    External(CacheMirror),
}

impl PersistSource {
    pub fn is_external(&self) -> bool {
        matches!(self, PersistSource::External(_))
    }
}

impl std::fmt::Debug for PersistSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistSource::OwnState => f.write_str("OwnState"),
            PersistSource::External(_) => f.write_str("External(..)"),
        }
    }
}

/// Configuration record every adaptor variant is built from.
#[derive(Debug, Clone, Default)]
pub struct AdaptorOptions {
    /// Storage path or identifier; each variant has its own default.
    pub location: Option<String>,
    pub persist: PersistSource,
}

impl AdaptorOptions {
    pub fn new(location: impl Into<String>) -> Self {
        Self { location: Some(location.into()), persist: PersistSource::OwnState }
    }

    pub fn with_persist(mut self, persist: PersistSource) -> Self {
        self.persist = persist;
        self
    }

    /// Build from an untyped `{ location, cache }` record.
    ///
    /// `location` must be a string when present (an empty one means "use the
    /// default"). `cache` may be absent, `null`, `false`, or an object that
    /// seeds the externally persisted state.
    pub fn from_value(record: &Value) -> Result<Self, StoreError> {
        let obj = match record {
            Value::Null => return Ok(Self::default()),
            Value::Object(obj) => obj,
            other => {
                return Err(StoreError::configuration(
                    "object",
                    format!("adaptor options must be an object, got '{}'", json_type_name(other)),
                ))
            }
        };

        let location = match obj.get("location").or_else(|| obj.get("path")) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(StoreError::configuration(
                    "string",
                    format!("The 'location' key must be a string, got '{}'.", json_type_name(other)),
                ))
            }
        };

        let persist = match obj.get("cache") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => PersistSource::OwnState,
            Some(Value::Object(seed)) => PersistSource::External(Arc::new(RwLock::new(seed.clone()))),
            Some(other) => {
                return Err(StoreError::configuration(
                    "object or false",
                    format!("The 'cache' key must be an object or false, got '{}'.", json_type_name(other)),
                ))
            }
        };

        Ok(Self { location, persist })
    }

    pub fn location_or(&self, default: &str) -> String {
        self.location.clone().unwrap_or_else(|| default.to_string())
    }
}

/// Capability set every backing store satisfies.
///
/// Reads on the file variant never touch the disk; mutations return once the
/// in-memory state is updated and persistence has been scheduled. Use
/// [`StorageAdaptor::ready`] and [`StorageAdaptor::flush`] to wait for the
/// background I/O.
#[async_trait]
pub trait StorageAdaptor: Send + Sync {
    /// Upsert `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn has(&self, key: &str) -> Result<bool, StoreError>;
    /// Delete `key`; absent keys are a no-op.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Numeric increment, see [`crate::coerce::add_numbers`]. Returns the stored result.
    async fn add(&self, key: &str, delta: &Value) -> Result<Value, StoreError>;
    /// Array append, see [`crate::coerce::push_values`]. Returns the stored result.
    async fn push(&self, key: &str, value: Value) -> Result<Value, StoreError>;
    /// Raw persisted document, for export and inspection. A file that was never
    /// written reads as `{}`.
    async fn all(&self) -> Result<String, StoreError>;
    /// The complete mapping as the adaptor currently sees it.
    async fn entries(&self) -> Result<Entries, StoreError>;
    /// Independent copy bound to `location`. Nothing is written until the copy is mutated.
    async fn clone_to(&self, location: &str) -> Result<Arc<dyn StorageAdaptor>, StoreError>;
    /// Resolves once start-up I/O (hydration or connection) has settled.
    async fn ready(&self) -> Result<(), StoreError>;
    /// Resolves once every persist scheduled before the call has completed.
    async fn flush(&self) -> Result<(), StoreError>;
    /// Schedule a rewrite of the persisted state without mutating anything.
    /// Adaptors that write through on every call have nothing to do.
    fn persist(&self) {}
    fn location(&self) -> &str;
    fn adaptor_name(&self) -> &'static str;
}

/// Constructs adaptors from [`AdaptorOptions`].
pub trait AdaptorFactory: Send + Sync {
    fn create(&self, options: AdaptorOptions) -> Result<Arc<dyn StorageAdaptor>, StoreError>;
}

impl<F> AdaptorFactory for F
where
    F: Fn(AdaptorOptions) -> Result<Arc<dyn StorageAdaptor>, StoreError> + Send + Sync,
{
    fn create(&self, options: AdaptorOptions) -> Result<Arc<dyn StorageAdaptor>, StoreError> {
        self(options)
    }
}

/// Background I/O needs a Tokio runtime; report its absence instead of panicking in `spawn`.
pub(crate) fn runtime_handle() -> Result<Handle, StoreError> {
    Handle::try_current().map_err(|_| {
        StoreError::configuration("tokio runtime", "adaptors must be created inside a Tokio runtime")
    })
}
