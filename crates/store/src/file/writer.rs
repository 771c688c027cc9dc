//! Background task owning all disk I/O of one [`super::FileAdaptor`].
//!
//! Hydration runs first, then persist commands are handled strictly in the
//! order they were sent. Each write serialises the state current at write
//! time, so bursts of mutations collapse into a single rewrite.

use std::io::ErrorKind;
use std::sync::Arc;

use serde_json::Value;
use tokio::fs;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::Shared;
use crate::adaptor::PersistSource;
use crate::errors::{json_type_name, StoreError};

pub(crate) enum WriterCommand {
    Persist,
    Flush(oneshot::Sender<()>),
}

pub(crate) async fn run(
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
    ready: watch::Sender<bool>,
    hydrate: bool,
) {
    if hydrate {
        shared.hydrate().await;
    }
    let _ = ready.send(true);

    while let Some(first) = commands.recv().await {
        let mut dirty = false;
        let mut acks = Vec::new();
        let mut pending = Some(first);
        while let Some(cmd) = pending.take().or_else(|| commands.try_recv().ok()) {
            match cmd {
                WriterCommand::Persist => dirty = true,
                WriterCommand::Flush(ack) => acks.push(ack),
            }
        }

        if dirty {
            if let Err(e) = shared.write_out().await {
                error!(path = %shared.file_path.display(), error = %e, "failed to persist store");
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
    debug!(path = %shared.file_path.display(), "store writer stopped");
}

impl Shared {
    /// Best-effort load. Entries written before hydration finished take precedence
    /// over the file's copy of the same key.
    async fn hydrate(&self) {
        let path = self.file_path.display();
        if let PersistSource::External(_) = self.persist {
            debug!(%path, "external persistence source; in-memory mapping left untouched");
            return;
        }
        let bytes = match fs::read(&self.file_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%path, "store file not found; starting empty");
                return;
            }
            Err(e) => {
                warn!(%path, error = %e, "failed to read store file; starting empty");
                return;
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        let loaded = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(%path, found = json_type_name(&other), "store file is not an object; starting empty");
                return;
            }
            Err(e) => {
                warn!(%path, error = %e, "store file is not valid JSON; starting empty");
                return;
            }
        };

        let mut data = self.data.write().await;
        let early = std::mem::replace(&mut *data, loaded);
        for (key, value) in early {
            data.insert(key, value);
        }
        info!(%path, entries = data.len(), "store hydrated");
    }

    async fn write_out(&self) -> Result<(), StoreError> {
        let body = match &self.persist {
            PersistSource::OwnState => serde_json::to_vec_pretty(&*self.data.read().await)?,
            PersistSource::External(cache) => serde_json::to_vec_pretty(&*cache.read().await)?,
        };
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.ok();
        }
        fs::write(&self.file_path, &body).await.map_err(StoreError::io)?;
        debug!(path = %self.file_path.display(), bytes = body.len(), "store persisted");
        Ok(())
    }
}
