//! The `Database` facade.
//!
//! Validates caller input, owns exactly one adaptor, and optionally keeps an
//! in-memory cache mirror in front of it. The mirror is filled on writes and
//! consulted on reads; it is not kept atomically consistent with the adaptor.

use std::sync::Arc;

use common::updater::{NotifyState, RegistrySource, UpdateChecker};
use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::adaptor::{AdaptorFactory, AdaptorOptions, CacheMirror, Entries, PersistSource, StorageAdaptor};
use crate::errors::{json_type_name, StoreError};

pub const TRANSFER_MESSAGE: &str = "transferred successfully!";

/// Process-wide record of update notices, shared by every database that checks for updates.
static UPDATE_NOTICES: Lazy<NotifyState> = Lazy::new(NotifyState::default);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Reads go straight to the adaptor.
    #[default]
    Off,
    /// Writes also land in a facade-owned mirror that serves `get`.
    Mirror,
    /// Like `Mirror`, and the adaptor persists the mirror instead of its own mapping.
    Persist,
}

impl From<configs::CacheSetting> for CacheMode {
    fn from(s: configs::CacheSetting) -> Self {
        match s {
            configs::CacheSetting::Off => CacheMode::Off,
            configs::CacheSetting::Mirror => CacheMode::Mirror,
            configs::CacheSetting::Persist => CacheMode::Persist,
        }
    }
}

#[derive(Default)]
pub struct DatabaseBuilder {
    factory: Option<Arc<dyn AdaptorFactory>>,
    location: Option<String>,
    cache: CacheMode,
    check_updates: bool,
    update_checker: Option<UpdateChecker>,
}

impl DatabaseBuilder {
    pub fn adaptor(mut self, factory: impl AdaptorFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn shared_adaptor(mut self, factory: Arc<dyn AdaptorFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// An empty location means "the adaptor's default".
    pub fn location(mut self, location: impl Into<String>) -> Self {
        let location = location.into();
        self.location = (!location.is_empty()).then_some(location);
        self
    }

    pub fn cache(mut self, mode: CacheMode) -> Self {
        self.cache = mode;
        self
    }

    pub fn check_updates(mut self, enabled: bool) -> Self {
        self.check_updates = enabled;
        self
    }

    /// Use `checker` instead of the registry lookup; implies `check_updates(true)`.
    pub fn update_checker(mut self, checker: UpdateChecker) -> Self {
        self.update_checker = Some(checker);
        self.check_updates = true;
        self
    }

    pub fn build(self) -> Result<Database, StoreError> {
        let factory = self.factory.ok_or_else(|| {
            StoreError::configuration("adaptor", "You must provide an Adaptor for the Database.")
        })?;

        let cache: Option<CacheMirror> = match self.cache {
            CacheMode::Off => None,
            CacheMode::Mirror | CacheMode::Persist => Some(Arc::new(RwLock::new(Entries::new()))),
        };
        let persist = match (&self.cache, &cache) {
            (CacheMode::Persist, Some(mirror)) => PersistSource::External(mirror.clone()),
            _ => PersistSource::OwnState,
        };
        let adaptor = factory.create(AdaptorOptions { location: self.location, persist })?;

        if self.check_updates {
            if Handle::try_current().is_ok() {
                let checker = self.update_checker.unwrap_or_else(|| {
                    UpdateChecker::new(
                        Arc::new(RegistrySource::default()),
                        env!("CARGO_PKG_VERSION"),
                        UPDATE_NOTICES.clone(),
                    )
                });
                drop(checker.spawn());
            } else {
                warn!("no Tokio runtime; skipping update check");
            }
        }

        debug!(
            adaptor = adaptor.adaptor_name(),
            location = adaptor.location(),
            cache = ?self.cache,
            "database opened"
        );
        Ok(Database { adaptor, cache, mode: self.cache })
    }
}

pub struct Database {
    adaptor: Arc<dyn StorageAdaptor>,
    cache: Option<CacheMirror>,
    mode: CacheMode,
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::validation("string", "Expected a non-empty 'string' key, but got an empty string."));
    }
    Ok(())
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// Build from an untyped `{ location, useCache, cache, checkUpdates }` record.
    ///
    /// `location` (or `path`) must be a string. `useCache` is a bool (`true` =
    /// mirror); `cache` takes a bool or one of `"off"`, `"mirror"`, `"persist"`
    /// and wins when both are given.
    pub fn from_value(factory: impl AdaptorFactory + 'static, record: &Value) -> Result<Self, StoreError> {
        let mut builder = Database::builder().adaptor(factory);
        let obj = match record {
            Value::Null => return builder.build(),
            Value::Object(obj) => obj,
            other => {
                return Err(StoreError::configuration(
                    "object",
                    format!("database options must be an object, got '{}'", json_type_name(other)),
                ))
            }
        };

        match obj.get("location").or_else(|| obj.get("path")) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => builder = builder.location(s.as_str()),
            Some(other) => {
                return Err(StoreError::configuration(
                    "string",
                    format!("The 'location' key must be a string, got '{}'.", json_type_name(other)),
                ))
            }
        }

        let mode = match obj.get("cache").filter(|v| !v.is_null()).or_else(|| obj.get("useCache")) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => CacheMode::Off,
            Some(Value::Bool(true)) => CacheMode::Mirror,
            Some(Value::String(s)) if s == "off" => CacheMode::Off,
            Some(Value::String(s)) if s == "mirror" => CacheMode::Mirror,
            Some(Value::String(s)) if s == "persist" => CacheMode::Persist,
            Some(other) => {
                return Err(StoreError::configuration(
                    "boolean or \"off\" | \"mirror\" | \"persist\"",
                    format!("unsupported 'cache' option {other}"),
                ))
            }
        };
        builder = builder.cache(mode);

        if let Some(check) = obj.get("checkUpdates") {
            let Value::Bool(check) = check else {
                return Err(StoreError::configuration("boolean", "The 'checkUpdates' key must be a boolean."));
            };
            builder = builder.check_updates(*check);
        }
        builder.build()
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        validate_key(key)?;
        if let Some(cache) = &self.cache {
            cache.write().await.insert(key.to_string(), value.clone());
        }
        self.adaptor.set(key, value).await
    }

    /// With caching enabled this answers from the mirror only, which may lag the adaptor.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match &self.cache {
            Some(cache) => Ok(cache.read().await.get(key).cloned()),
            None => self.adaptor.get(key).await,
        }
    }

    pub async fn has(&self, key: &str) -> Result<bool, StoreError> {
        self.adaptor.has(key).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        if let Some(cache) = &self.cache {
            cache.write().await.shift_remove(key);
        }
        self.adaptor.remove(key).await
    }

    pub async fn add(&self, key: &str, delta: impl Into<Value>) -> Result<Value, StoreError> {
        validate_key(key)?;
        let sum = self.adaptor.add(key, &delta.into()).await?;
        self.mirror(key, &sum).await;
        Ok(sum)
    }

    pub async fn push(&self, key: &str, value: impl Into<Value>) -> Result<Value, StoreError> {
        validate_key(key)?;
        let list = self.adaptor.push(key, value.into()).await?;
        self.mirror(key, &list).await;
        Ok(list)
    }

    /// Copy an adaptor result into the mirror. In `Persist` mode the mirror is
    /// what reaches disk, so another write is scheduled after the copy.
    async fn mirror(&self, key: &str, value: &Value) {
        if let Some(cache) = &self.cache {
            cache.write().await.insert(key.to_string(), value.clone());
            if self.mode == CacheMode::Persist {
                self.adaptor.persist();
            }
        }
    }

    /// `set` every entry of `source`, in its key order. Not atomic: a failure
    /// part-way leaves the earlier entries applied.
    pub async fn transfer(&self, source: &Value) -> Result<&'static str, StoreError> {
        let Value::Object(entries) = source else {
            return Err(StoreError::validation(
                "object",
                format!("Input database must be an object, got '{}'.", json_type_name(source)),
            ));
        };
        for (key, value) in entries {
            self.set(key, value.clone()).await?;
        }
        Ok(TRANSFER_MESSAGE)
    }

    /// [`Database::transfer`], then hand the completion message to `on_complete`.
    pub async fn transfer_with<F>(&self, source: &Value, on_complete: F) -> Result<(), StoreError>
    where
        F: FnOnce(&str),
    {
        let message = self.transfer(source).await?;
        on_complete(message);
        Ok(())
    }

    /// Copy of the adaptor bound to this database's own location.
    pub async fn clone_store(&self) -> Result<Arc<dyn StorageAdaptor>, StoreError> {
        self.adaptor.clone_to(self.adaptor.location()).await
    }

    pub async fn clone_to(&self, location: &str) -> Result<Arc<dyn StorageAdaptor>, StoreError> {
        self.adaptor.clone_to(location).await
    }

    /// Every persisted entry. Pending writes are flushed first.
    pub async fn all(&self) -> Result<Entries, StoreError> {
        self.adaptor.flush().await?;
        let raw = self.adaptor.all().await?;
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(entries) => Ok(entries),
            other => Err(StoreError::serialization(format!(
                "persisted document is a {}, not an object",
                json_type_name(&other)
            ))),
        }
    }

    /// Contents of the cache mirror; `None` when caching is off.
    pub async fn get_cache(&self) -> Option<Entries> {
        match &self.cache {
            Some(cache) => Some(cache.read().await.clone()),
            None => None,
        }
    }

    pub async fn ready(&self) -> Result<(), StoreError> {
        self.adaptor.ready().await
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.adaptor.flush().await
    }

    pub fn location(&self) -> &str {
        self.adaptor.location()
    }

    pub fn adaptor_name(&self) -> &'static str {
        self.adaptor.adaptor_name()
    }

    pub fn adaptor(&self) -> &Arc<dyn StorageAdaptor> {
        &self.adaptor
    }
}
