//! JSON file adaptor.
//!
//! Keeps the whole mapping in memory and mirrors it to one pretty-printed JSON
//! file, rewritten in full after every mutation. Construction returns at once;
//! hydration and writes happen on a background task (see [`writer`]).

mod writer;

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tracing::warn;

use crate::adaptor::{runtime_handle, AdaptorFactory, AdaptorOptions, Entries, PersistSource, StorageAdaptor};
use crate::coerce;
use crate::errors::StoreError;
use writer::WriterCommand;

pub const DEFAULT_LOCATION: &str = configs::DEFAULT_LOCATION;

pub(crate) struct Shared {
    file_path: PathBuf,
    data: RwLock<Entries>,
    persist: PersistSource,
}

pub struct FileAdaptor {
    shared: Arc<Shared>,
    location: String,
    commands: mpsc::UnboundedSender<WriterCommand>,
    ready: watch::Receiver<bool>,
}

impl FileAdaptor {
    /// Bind to `options.location` (default `elegant.json`) and start hydrating from it.
    pub fn new(options: AdaptorOptions) -> Result<Self, StoreError> {
        let location = options.location_or(DEFAULT_LOCATION);
        Self::start(location, options.persist, Entries::new(), true)
    }

    /// Convenience for `FileAdaptor::new(AdaptorOptions::new(location))`.
    pub fn open(location: impl Into<String>) -> Result<Self, StoreError> {
        Self::new(AdaptorOptions::new(location))
    }

    fn start(location: String, persist: PersistSource, data: Entries, hydrate: bool) -> Result<Self, StoreError> {
        let handle = runtime_handle()?;
        let shared = Arc::new(Shared { file_path: PathBuf::from(&location), data: RwLock::new(data), persist });
        let (commands, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready) = watch::channel(false);
        handle.spawn(writer::run(shared.clone(), rx, ready_tx, hydrate));
        Ok(Self { shared, location, commands, ready })
    }

    fn schedule_persist(&self) {
        if self.commands.send(WriterCommand::Persist).is_err() {
            warn!(location = %self.location, "store writer is gone; change kept in memory only");
        }
    }
}

#[async_trait]
impl StorageAdaptor for FileAdaptor {
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.shared.data.write().await.insert(key.to_string(), value);
        self.schedule_persist();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.shared.data.read().await.get(key).cloned())
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.shared.data.read().await.contains_key(key))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.shared.data.write().await.shift_remove(key).is_some();
        if removed {
            self.schedule_persist();
        }
        Ok(())
    }

    async fn add(&self, key: &str, delta: &Value) -> Result<Value, StoreError> {
        let mut data = self.shared.data.write().await;
        let sum = coerce::add_numbers(data.get(key), delta)?;
        data.insert(key.to_string(), sum.clone());
        drop(data);
        self.schedule_persist();
        Ok(sum)
    }

    async fn push(&self, key: &str, value: Value) -> Result<Value, StoreError> {
        let mut data = self.shared.data.write().await;
        let list = coerce::push_values(data.get(key).cloned(), value);
        data.insert(key.to_string(), list.clone());
        drop(data);
        self.schedule_persist();
        Ok(list)
    }

    async fn all(&self) -> Result<String, StoreError> {
        match fs::read_to_string(&self.shared.file_path).await {
            Ok(raw) => Ok(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok("{}".to_string()),
            Err(e) => Err(StoreError::io(e)),
        }
    }

    async fn entries(&self) -> Result<Entries, StoreError> {
        Ok(self.shared.data.read().await.clone())
    }

    async fn clone_to(&self, location: &str) -> Result<Arc<dyn StorageAdaptor>, StoreError> {
        let snapshot = self.shared.data.read().await.clone();
        let copy = Self::start(location.to_string(), PersistSource::OwnState, snapshot, false)?;
        Ok(Arc::new(copy))
    }

    async fn ready(&self) -> Result<(), StoreError> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|done| *done)
            .await
            .map(|_| ())
            .map_err(|_| StoreError::io("store writer stopped before hydration finished"))
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(WriterCommand::Flush(ack))
            .map_err(|_| StoreError::io("store writer is not running"))?;
        done.await.map_err(|_| StoreError::io("store writer stopped before flushing"))
    }

    fn persist(&self) {
        self.schedule_persist();
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn adaptor_name(&self) -> &'static str {
        "JSON"
    }
}

/// Factory for [`FileAdaptor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FileAdaptorFactory;

impl AdaptorFactory for FileAdaptorFactory {
    fn create(&self, options: AdaptorOptions) -> Result<Arc<dyn StorageAdaptor>, StoreError> {
        Ok(Arc::new(FileAdaptor::new(options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn tmp_location(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("elegant_{tag}_{}.json", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn file_adaptor_crud_persists() -> Result<(), anyhow::Error> {
        let tmp = tmp_location("crud");
        let store = FileAdaptor::open(&tmp)?;
        store.ready().await?;

        // initially empty
        assert!(store.entries().await?.is_empty());

        store.set("a", json!(1)).await?;
        store.set("b", json!({ "nested": [true, null] })).await?;
        assert_eq!(store.get("a").await?, Some(json!(1)));
        assert!(store.has("b").await?);

        store.remove("a").await?;
        store.remove("missing").await?;
        assert!(!store.has("a").await?);
        store.flush().await?;

        // reload persistence
        let reloaded = FileAdaptor::open(&tmp)?;
        reloaded.ready().await?;
        assert_eq!(reloaded.entries().await?, store.entries().await?);

        let _ = tokio::fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn file_is_pretty_printed_object() -> Result<(), anyhow::Error> {
        let tmp = tmp_location("pretty");
        let store = FileAdaptor::open(&tmp)?;
        store.set("k", json!("v")).await?;
        store.flush().await?;

        let raw = store.all().await?;
        assert!(raw.contains('\n'));
        assert_eq!(serde_json::from_str::<Value>(&raw)?, json!({ "k": "v" }));

        let _ = tokio::fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_or_non_object_file_yields_empty_store() -> Result<(), anyhow::Error> {
        for body in ["{ not json", "[1, 2, 3]", ""] {
            let tmp = tmp_location("corrupt");
            tokio::fs::write(&tmp, body).await?;
            let store = FileAdaptor::open(&tmp)?;
            store.ready().await?;
            assert!(store.entries().await?.is_empty(), "body {body:?}");
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        Ok(())
    }

    #[tokio::test]
    async fn writes_before_hydration_win_over_file() -> Result<(), anyhow::Error> {
        let tmp = tmp_location("race");
        tokio::fs::write(&tmp, r#"{ "kept": 1, "raced": "old" }"#).await?;

        let store = FileAdaptor::open(&tmp)?;
        store.set("raced", json!("new")).await?;
        store.ready().await?;

        assert_eq!(store.get("kept").await?, Some(json!(1)));
        assert_eq!(store.get("raced").await?, Some(json!("new")));
        store.flush().await?;
        let on_disk: Value = serde_json::from_str(&store.all().await?)?;
        assert_eq!(on_disk, json!({ "kept": 1, "raced": "new" }));

        let _ = tokio::fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn add_and_push_coerce() -> Result<(), anyhow::Error> {
        let tmp = tmp_location("coerce");
        let store = FileAdaptor::open(&tmp)?;
        store.ready().await?;

        assert_eq!(store.add("n", &json!(2)).await?, json!(2));
        assert_eq!(store.add("n", &json!(3)).await?, json!(5));
        let err = store.add("n", &json!("+1")).await.unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
        assert_eq!(store.get("n").await?, Some(json!(5)));

        store.set("list", json!("scalar")).await?;
        assert_eq!(store.push("list", json!("x")).await?, json!(["x"]));
        assert_eq!(store.push("list", json!(["y", "z"])).await?, json!(["x", "y", "z"]));

        store.flush().await?;
        let _ = tokio::fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn clone_is_an_independent_snapshot() -> Result<(), anyhow::Error> {
        let src = tmp_location("clone_src");
        let dst = tmp_location("clone_dst");
        let store = FileAdaptor::open(&src)?;
        store.ready().await?;
        store.set("shared", json!({ "deep": [1] })).await?;

        let copy = store.clone_to(&dst).await?;
        copy.ready().await?;
        assert_eq!(copy.entries().await?, store.entries().await?);
        assert_eq!(copy.location(), dst);
        // not eagerly written
        assert!(tokio::fs::metadata(&dst).await.is_err());

        copy.push("shared", json!(2)).await?;
        store.set("only_src", json!(true)).await?;
        assert_eq!(store.get("shared").await?, Some(json!({ "deep": [1] })));
        assert!(!copy.has("only_src").await?);

        store.flush().await?;
        copy.flush().await?;
        let _ = tokio::fs::remove_file(&src).await;
        let _ = tokio::fs::remove_file(&dst).await;
        Ok(())
    }

    #[tokio::test]
    async fn external_source_is_what_gets_written() -> Result<(), anyhow::Error> {
        let tmp = tmp_location("external");
        tokio::fs::write(&tmp, r#"{ "from_file": 1 }"#).await?;
        let cache = Arc::new(RwLock::new(Entries::new()));
        let store = FileAdaptor::new(AdaptorOptions::new(&tmp).with_persist(PersistSource::External(cache.clone())))?;
        store.ready().await?;

        // hydration leaves the mapping alone
        assert!(!store.has("from_file").await?);

        cache.write().await.insert("cached".into(), json!("yes"));
        store.set("own", json!("no")).await?;
        store.flush().await?;
        let on_disk: Value = serde_json::from_str(&store.all().await?)?;
        assert_eq!(on_disk, json!({ "cached": "yes" }));

        let _ = tokio::fs::remove_file(&tmp).await;
        Ok(())
    }

    #[tokio::test]
    async fn never_written_file_reads_as_empty_object() -> Result<(), anyhow::Error> {
        let store = FileAdaptor::open(tmp_location("missing"))?;
        store.ready().await?;
        assert_eq!(store.all().await?, "{}");
        assert_eq!(store.adaptor_name(), "JSON");

        // a directory is not a readable store file
        let dir = FileAdaptor::open(std::env::temp_dir().display().to_string())?;
        dir.ready().await?;
        assert!(matches!(dir.all().await, Err(StoreError::Io { .. })));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn explicit_persist_rewrites_external_source() -> Result<(), anyhow::Error> {
        let tmp = tmp_location("persist");
        let cache = Arc::new(RwLock::new(Entries::new()));
        let store = FileAdaptor::new(AdaptorOptions::new(&tmp).with_persist(PersistSource::External(cache.clone())))?;
        store.ready().await?;

        store.set("k", json!(1)).await?;
        store.flush().await?;
        cache.write().await.insert("k".into(), json!(2));
        store.persist();
        store.flush().await?;

        let on_disk: Value = serde_json::from_str(&store.all().await?)?;
        assert_eq!(on_disk, json!({ "k": 2 }));
        let _ = tokio::fs::remove_file(&tmp).await;
        Ok(())
    }

    #[test]
    fn construction_outside_runtime_fails() {
        let err = FileAdaptor::open("elegant.json").err().unwrap();
        assert!(matches!(err, StoreError::Configuration { .. }));
    }
}
