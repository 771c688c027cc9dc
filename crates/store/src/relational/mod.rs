//! Relational adaptor.
//!
//! A direct pass-through to a SQL database through sea-orm. Each call is one
//! (occasionally two) round-trips with no surrounding transaction. The key/value
//! wrappers assume a `key_column`/`value_column` table, as created by the
//! `migration` crate or [`RelationalAdaptor::ensure_table`].

pub mod statements;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, FromQueryResult, JsonValue, Statement};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::adaptor::{runtime_handle, AdaptorFactory, AdaptorOptions, Entries, StorageAdaptor};
use crate::coerce;
use crate::errors::StoreError;
use statements::{KEY_COLUMN, VALUE_COLUMN};

pub const DEFAULT_TABLE: &str = configs::DEFAULT_TABLE;

/// Connection parameters shared by an adaptor and its clones.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub sqlx_logging: bool,
}

impl ConnectSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), connect_timeout: Duration::from_secs(30), sqlx_logging: false }
    }

    pub fn from_config(cfg: &configs::DatabaseConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            sqlx_logging: cfg.sqlx_logging,
        }
    }
}

type ConnectionCell = OnceCell<Result<DatabaseConnection, String>>;

async fn init_connection<'a>(cell: &'a ConnectionCell, settings: &ConnectSettings) -> &'a Result<DatabaseConnection, String> {
    cell.get_or_init(move || async move {
        let mut opt = ConnectOptions::new(settings.url.clone());
        opt.connect_timeout(settings.connect_timeout).sqlx_logging(settings.sqlx_logging);
        match Database::connect(opt).await {
            Ok(db) => {
                info!(backend = ?db.get_database_backend(), "connected to relational store");
                Ok(db)
            }
            Err(e) => {
                warn!(error = %e, "failed to connect to relational store");
                Err(e.to_string())
            }
        }
    })
    .await
}

pub struct RelationalAdaptor {
    settings: ConnectSettings,
    table: String,
    conn: Arc<ConnectionCell>,
}

impl RelationalAdaptor {
    /// Start connecting in the background. Connection failures surface on first use.
    pub fn new(settings: ConnectSettings, options: AdaptorOptions) -> Result<Self, StoreError> {
        let table = options.location_or(DEFAULT_TABLE);
        statements::ensure_identifier("table", &table)
            .map_err(|e| StoreError::configuration("identifier", e.to_string()))?;
        let handle = runtime_handle()?;

        let conn = Arc::new(ConnectionCell::new());
        let (cell, init_settings) = (conn.clone(), settings.clone());
        handle.spawn(async move {
            let _ = init_connection(&cell, &init_settings).await;
        });
        Ok(Self { settings, table, conn })
    }

    /// The live connection, waiting for the initial attempt if it is still running.
    pub async fn connection(&self) -> Result<&DatabaseConnection, StoreError> {
        init_connection(&self.conn, &self.settings).await.as_ref().map_err(StoreError::db)
    }

    pub async fn check_connection(&self) -> bool {
        match self.connection().await {
            Ok(db) => db.ping().await.is_ok(),
            Err(_) => false,
        }
    }

    /// Close the pool. Later calls on this adaptor (and its clones) fail.
    pub async fn disconnect(&self) -> Result<(), StoreError> {
        let db = self.connection().await?.clone();
        db.close().await?;
        info!(table = %self.table, "disconnected from relational store");
        Ok(())
    }

    /// Create this adaptor's key/value table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        let db = self.connection().await?;
        let stmt = db.get_database_backend().build(&statements::create_kv_table(&self.table));
        db.execute(stmt).await?;
        Ok(())
    }

    /// Run arbitrary SQL with bound parameters; rows come back as JSON objects.
    pub async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, StoreError> {
        let db = self.connection().await?;
        let stmt = Statement::from_sql_and_values(
            db.get_database_backend(),
            sql,
            params.iter().map(statements::to_db_value),
        );
        Ok(JsonValue::find_by_statement(stmt).all(db).await?)
    }

    pub async fn insert_row(&self, table: &str, values: &Map<String, Value>) -> Result<u64, StoreError> {
        statements::ensure_identifier("table", table)?;
        let (columns, bound) = statements::columns_and_values(values)?;
        let db = self.connection().await?;
        let backend = db.get_database_backend();
        let stmt = Statement::from_sql_and_values(backend, statements::insert_sql(backend, table, &columns), bound);
        Ok(db.execute(stmt).await?.rows_affected())
    }

    /// `condition` is a trusted SQL fragment placed after `WHERE`.
    pub async fn update_rows(&self, table: &str, values: &Map<String, Value>, condition: &str) -> Result<u64, StoreError> {
        statements::ensure_identifier("table", table)?;
        let (columns, bound) = statements::columns_and_values(values)?;
        let db = self.connection().await?;
        let backend = db.get_database_backend();
        let sql = statements::update_sql(backend, table, &columns, condition);
        Ok(db.execute(Statement::from_sql_and_values(backend, sql, bound)).await?.rows_affected())
    }

    pub async fn delete_rows(&self, table: &str, condition: &str) -> Result<u64, StoreError> {
        statements::ensure_identifier("table", table)?;
        let db = self.connection().await?;
        let stmt = Statement::from_string(db.get_database_backend(), statements::delete_sql(table, condition));
        Ok(db.execute(stmt).await?.rows_affected())
    }

    pub async fn select_rows(&self, table: &str, condition: &str) -> Result<Vec<Value>, StoreError> {
        statements::ensure_identifier("table", table)?;
        let db = self.connection().await?;
        let stmt = Statement::from_string(db.get_database_backend(), statements::select_sql(table, condition));
        Ok(JsonValue::find_by_statement(stmt).all(db).await?)
    }

    pub async fn count_rows(&self, table: &str, condition: &str) -> Result<u64, StoreError> {
        statements::ensure_identifier("table", table)?;
        let db = self.connection().await?;
        let stmt = Statement::from_string(db.get_database_backend(), statements::count_sql(table, condition));
        let count = match db.query_one(stmt).await? {
            Some(row) => row.try_get::<i64>("", "count")?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    /// Upsert: update the row for `key`, inserting it when nothing matched.
    pub async fn set_row_by_key(&self, table: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        statements::ensure_identifier("table", table)?;
        let encoded = statements::encode_value(value)?;
        let db = self.connection().await?;
        let backend = db.get_database_backend();

        let update = format!(
            "UPDATE {table} SET {VALUE_COLUMN} = {} WHERE {}",
            statements::placeholder(backend, 1),
            statements::key_condition(backend, 2)
        );
        let updated = db
            .execute(Statement::from_sql_and_values(backend, update, [encoded.clone().into(), key.into()]))
            .await?
            .rows_affected();
        if updated == 0 {
            let columns = [KEY_COLUMN.to_string(), VALUE_COLUMN.to_string()];
            let insert = statements::insert_sql(backend, table, &columns);
            db.execute(Statement::from_sql_and_values(backend, insert, [key.into(), encoded.into()]))
                .await?;
        }
        Ok(())
    }

    pub async fn get_row_by_key(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError> {
        statements::ensure_identifier("table", table)?;
        let db = self.connection().await?;
        let backend = db.get_database_backend();
        let sql = statements::select_sql(table, &statements::key_condition(backend, 1));
        let stmt = Statement::from_sql_and_values(backend, sql, [key.into()]);
        Ok(JsonValue::find_by_statement(stmt).one(db).await?)
    }

    pub async fn delete_row_by_key(&self, table: &str, key: &str) -> Result<u64, StoreError> {
        statements::ensure_identifier("table", table)?;
        let db = self.connection().await?;
        let backend = db.get_database_backend();
        let sql = statements::delete_sql(table, &statements::key_condition(backend, 1));
        Ok(db.execute(Statement::from_sql_and_values(backend, sql, [key.into()])).await?.rows_affected())
    }

    pub async fn delete_all_rows(&self, table: &str) -> Result<u64, StoreError> {
        statements::ensure_identifier("table", table)?;
        let db = self.connection().await?;
        let stmt = Statement::from_string(db.get_database_backend(), format!("DELETE FROM {table}"));
        Ok(db.execute(stmt).await?.rows_affected())
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl StorageAdaptor for RelationalAdaptor {
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.set_row_by_key(&self.table, key, &value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let row = self.get_row_by_key(&self.table, key).await?;
        Ok(row.map(|r| statements::decode_value(r.get(VALUE_COLUMN))))
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get_row_by_key(&self.table, key).await?.is_some())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.delete_row_by_key(&self.table, key).await.map(|_| ())
    }

    async fn add(&self, key: &str, delta: &Value) -> Result<Value, StoreError> {
        let current = StorageAdaptor::get(self, key).await?;
        let sum = coerce::add_numbers(current.as_ref(), delta)?;
        self.set_row_by_key(&self.table, key, &sum).await?;
        Ok(sum)
    }

    async fn push(&self, key: &str, value: Value) -> Result<Value, StoreError> {
        let current = StorageAdaptor::get(self, key).await?;
        let list = coerce::push_values(current, value);
        self.set_row_by_key(&self.table, key, &list).await?;
        Ok(list)
    }

    async fn all(&self) -> Result<String, StoreError> {
        let entries = self.entries().await?;
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    async fn entries(&self) -> Result<Entries, StoreError> {
        let rows = self.execute_query(&format!("SELECT {KEY_COLUMN}, {VALUE_COLUMN} FROM {}", self.table), &[]).await?;
        let mut entries = Entries::new();
        for row in rows {
            if let Some(Value::String(key)) = row.get(KEY_COLUMN) {
                entries.insert(key.clone(), statements::decode_value(row.get(VALUE_COLUMN)));
            }
        }
        Ok(entries)
    }

    /// Copies every row into `location`, a table that must already exist.
    async fn clone_to(&self, location: &str) -> Result<Arc<dyn StorageAdaptor>, StoreError> {
        statements::ensure_identifier("table", location)?;
        let copy = RelationalAdaptor { settings: self.settings.clone(), table: location.to_string(), conn: self.conn.clone() };
        for (key, value) in self.entries().await? {
            copy.set_row_by_key(location, &key, &value).await?;
        }
        Ok(Arc::new(copy))
    }

    async fn ready(&self) -> Result<(), StoreError> {
        self.connection().await.map(|_| ())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn location(&self) -> &str {
        &self.table
    }

    fn adaptor_name(&self) -> &'static str {
        "SQL"
    }
}

/// Factory for [`RelationalAdaptor`]; `location` selects the table.
#[derive(Debug, Clone)]
pub struct RelationalAdaptorFactory {
    settings: ConnectSettings,
}

impl RelationalAdaptorFactory {
    pub fn new(settings: ConnectSettings) -> Self {
        Self { settings }
    }
}

impl AdaptorFactory for RelationalAdaptorFactory {
    fn create(&self, options: AdaptorOptions) -> Result<Arc<dyn StorageAdaptor>, StoreError> {
        Ok(Arc::new(RelationalAdaptor::new(self.settings.clone(), options)?))
    }
}
