use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;

pub const DEFAULT_CONFIG_PATH: &str = "elegant.toml";
pub const DEFAULT_LOCATION: &str = "elegant.json";
pub const DEFAULT_TABLE: &str = "elegant_kv";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheSetting {
    #[default]
    Off,
    Mirror,
    Persist,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default)]
    pub cache: CacheSetting,
    #[serde(default)]
    pub check_updates: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { location: default_location(), cache: CacheSetting::Off, check_updates: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub sqlx_logging: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            table: default_table(),
            connect_timeout_secs: default_connect_timeout(),
            sqlx_logging: false,
        }
    }
}

fn default_location() -> String { DEFAULT_LOCATION.to_string() }
fn default_table() -> String { DEFAULT_TABLE.to_string() }
fn default_connect_timeout() -> u64 { 30 }

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

/// Load the configured file, falling back to defaults when it does not exist.
/// A file that exists but fails to parse is still an error.
pub fn load_or_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if !std::path::Path::new(&path).exists() {
        return Ok(AppConfig::default());
    }
    load_from_file(&path)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = load_or_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.store.normalize();
        self.database.normalize_from_env();
        self.database.validate()?;
        Ok(())
    }
}

impl StoreConfig {
    fn normalize(&mut self) {
        if self.location.trim().is_empty() {
            self.location = default_location();
        }
    }
}

impl DatabaseConfig {
    pub fn normalize_from_env(&mut self) {
        // fall back to DATABASE_URL when the file leaves the url blank
        if self.url.trim().is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.url = url;
            }
        }
    }

    /// The url is optional (only the relational adaptor needs it), the table name is not.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.table) {
            return Err(anyhow!("database.table must be a plain identifier, got {:?}", self.table));
        }
        if self.connect_timeout_secs == 0 {
            return Err(anyhow!("database.connect_timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// ASCII letters, digits and underscores, not starting with a digit.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
