//! ElegantDB: an embedded key/value store persisted to a JSON file or a SQL table.
//!
//! ```no_run
//! use elegantdb::{Database, FileAdaptorFactory};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), elegantdb::StoreError> {
//! let db = Database::builder().adaptor(FileAdaptorFactory).location("elegant.json").build()?;
//! db.ready().await?;
//! db.set("greeting", json!("hello")).await?;
//! db.add("visits", 1).await?;
//! db.flush().await?;
//! # Ok(())
//! # }
//! ```

pub use store::*;

pub mod config {
    pub use configs::{AppConfig, CacheSetting, DatabaseConfig, StoreConfig};
}

pub mod logging {
    pub use common::utils::logging::{init_logging_default, init_logging_json};
}

pub mod updater {
    pub use common::updater::*;
}

use std::sync::Arc;

/// Open a database as described by `cfg`: the relational adaptor when a database
/// url is configured, the JSON file adaptor otherwise.
pub fn open_from_config(cfg: &configs::AppConfig) -> Result<Database, StoreError> {
    let factory: Arc<dyn AdaptorFactory> = if cfg.database.has_url() {
        Arc::new(RelationalAdaptorFactory::new(ConnectSettings::from_config(&cfg.database)))
    } else {
        Arc::new(FileAdaptorFactory)
    };
    let location = if cfg.database.has_url() { cfg.database.table.clone() } else { cfg.store.location.clone() };
    Database::builder()
        .shared_adaptor(factory)
        .location(location)
        .cache(cfg.store.cache.into())
        .check_updates(cfg.store.check_updates)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_adaptor_without_database_url() {
        let mut cfg = configs::AppConfig::default();
        cfg.store.location = std::env::temp_dir()
            .join(format!("elegant_open_{}.json", std::process::id()))
            .to_string_lossy()
            .into_owned();
        let db = open_from_config(&cfg).unwrap();
        assert_eq!(db.adaptor_name(), "JSON");
        assert_eq!(db.location(), cfg.store.location);
    }
}
