//! Environment/runtime helpers
//!
//! Sanity checks to ensure a store location is usable at startup.

use std::path::Path;
use tracing::warn;

/// Ensure the directory holding `location` exists; warn when the file itself is missing.
pub async fn ensure_store_dir(location: &str) -> anyhow::Result<()> {
    let path = Path::new(location);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", parent.display()))?;
    }
    if tokio::fs::metadata(path).await.is_err() {
        warn!(%location, "store file not found; it will be created on first write");
    }
    Ok(())
}
