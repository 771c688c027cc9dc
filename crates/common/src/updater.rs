//! Update notification
//!
//! Queries a package registry for the latest published version and emits a
//! single notice per newer version. Failures never reach the caller; they are
//! logged and reported as [`CheckOutcome::Unavailable`].

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::CoreError;

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org/elegantdb";

/// How far apart two versions are, by the first differing component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTier {
    Major,
    Patch,
    Build,
}

impl fmt::Display for UpdateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateTier::Major => "Major",
            UpdateTier::Patch => "Patch",
            UpdateTier::Build => "Build",
        };
        f.write_str(s)
    }
}

/// Compare dot-separated components pairwise. Missing components count as `0`.
///
/// Component 0 is the major tier, components 1 and 2 the patch tier, and
/// anything after that the build tier. Returns `None` for equal versions.
pub fn classify(current: &str, latest: &str) -> Option<UpdateTier> {
    let cur: Vec<&str> = current.trim().split('.').collect();
    let lat: Vec<&str> = latest.trim().split('.').collect();
    let len = cur.len().max(lat.len());
    (0..len)
        .find(|&i| cur.get(i).copied().unwrap_or("0") != lat.get(i).copied().unwrap_or("0"))
        .map(|i| match i {
            0 => UpdateTier::Major,
            1 | 2 => UpdateTier::Patch,
            _ => UpdateTier::Build,
        })
}

/// Source of the latest published version.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn latest_version(&self) -> Result<String, CoreError>;
}

/// Registry document lookup: reads `dist-tags.latest`.
pub struct RegistrySource {
    url: String,
    client: reqwest::Client,
}

impl RegistrySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new() }
    }
}

impl Default for RegistrySource {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_URL)
    }
}

#[async_trait]
impl VersionSource for RegistrySource {
    async fn latest_version(&self) -> Result<String, CoreError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;
        let json = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| CoreError::Parse(e.to_string()))?;
        json.pointer("/dist-tags/latest")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CoreError::Parse("registry document has no dist-tags.latest".into()))
    }
}

/// Remembers which version a notice was already emitted for.
///
/// Cloning shares the state, so one value can be handed to every checker in
/// a process (or a fresh one per test).
#[derive(Clone, Default)]
pub struct NotifyState {
    last: Arc<Mutex<Option<String>>>,
}

impl NotifyState {
    pub fn last_notified(&self) -> Option<String> {
        self.last.lock().ok().and_then(|g| g.clone())
    }

    /// Record `version`; returns false when it was already the last notified one.
    fn mark(&self, version: &str) -> bool {
        match self.last.lock() {
            Ok(mut g) => {
                if g.as_deref() == Some(version) {
                    return false;
                }
                *g = Some(version.to_string());
                true
            }
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    UpToDate,
    Notified { tier: UpdateTier, current: String, latest: String },
    AlreadyNotified,
    Unavailable,
}

pub struct UpdateChecker {
    source: Arc<dyn VersionSource>,
    current: String,
    state: NotifyState,
}

impl UpdateChecker {
    pub fn new(source: Arc<dyn VersionSource>, current: impl Into<String>, state: NotifyState) -> Self {
        Self { source, current: current.into(), state }
    }

    pub async fn check(&self) -> CheckOutcome {
        let latest = match self.source.latest_version().await {
            Ok(v) => v,
            Err(e) => {
                warn!(event = "update_check_failed", error = %e, "failed to retrieve version information");
                return CheckOutcome::Unavailable;
            }
        };

        let Some(tier) = classify(&self.current, &latest) else {
            return CheckOutcome::UpToDate;
        };
        if !self.state.mark(&latest) {
            return CheckOutcome::AlreadyNotified;
        }

        info!(
            event = "update_available",
            %tier,
            current = %self.current,
            %latest,
            "new {tier} version available: {} > {latest}",
            self.current
        );
        CheckOutcome::Notified { tier, current: self.current.clone(), latest }
    }

    /// Run the check in the background; the outcome is only logged.
    pub fn spawn(self) -> tokio::task::JoinHandle<CheckOutcome> {
        tokio::spawn(async move { self.check().await })
    }
}
