//! SQL text and parameter helpers for the relational adaptor.

use sea_orm::sea_query::{Alias, ColumnDef, Table, TableCreateStatement};
use sea_orm::DbBackend;
use serde_json::{Map, Value};

use crate::errors::StoreError;

pub const KEY_COLUMN: &str = "key_column";
pub const VALUE_COLUMN: &str = "value_column";

/// Table and column names are spliced into SQL text, so only plain identifiers pass.
pub fn ensure_identifier(kind: &str, name: &str) -> Result<(), StoreError> {
    if configs::is_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::validation(
            "identifier",
            format!("{kind} name {name:?} must contain only letters, digits and underscores"),
        ))
    }
}

/// 1-based placeholder in the backend's dialect.
pub fn placeholder(backend: DbBackend, index: usize) -> String {
    match backend {
        DbBackend::Postgres => format!("${index}"),
        _ => "?".to_string(),
    }
}

fn placeholders(backend: DbBackend, from: usize, count: usize) -> Vec<String> {
    (from..from + count).map(|i| placeholder(backend, i)).collect()
}

/// Scalars bind natively; arrays and objects are bound as JSON text.
pub fn to_db_value(value: &Value) -> sea_orm::Value {
    match value {
        Value::Null => sea_orm::Value::String(None),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.clone().into(),
        other => other.to_string().into(),
    }
}

/// Split a row map into validated column names and bound values.
pub fn columns_and_values(values: &Map<String, Value>) -> Result<(Vec<String>, Vec<sea_orm::Value>), StoreError> {
    if values.is_empty() {
        return Err(StoreError::validation("non-empty object", "no columns given"));
    }
    let mut columns = Vec::with_capacity(values.len());
    let mut bound = Vec::with_capacity(values.len());
    for (column, value) in values {
        ensure_identifier("column", column)?;
        columns.push(column.clone());
        bound.push(to_db_value(value));
    }
    Ok((columns, bound))
}

pub fn insert_sql(backend: DbBackend, table: &str, columns: &[String]) -> String {
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders(backend, 1, columns.len()).join(", ")
    )
}

pub fn update_sql(backend: DbBackend, table: &str, columns: &[String], condition: &str) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .zip(placeholders(backend, 1, columns.len()))
        .map(|(c, p)| format!("{c} = {p}"))
        .collect();
    format!("UPDATE {table} SET {} WHERE {condition}", assignments.join(", "))
}

pub fn delete_sql(table: &str, condition: &str) -> String {
    format!("DELETE FROM {table} WHERE {condition}")
}

pub fn select_sql(table: &str, condition: &str) -> String {
    format!("SELECT * FROM {table} WHERE {condition}")
}

pub fn count_sql(table: &str, condition: &str) -> String {
    format!("SELECT COUNT(*) AS count FROM {table} WHERE {condition}")
}

pub fn key_condition(backend: DbBackend, index: usize) -> String {
    format!("{KEY_COLUMN} = {}", placeholder(backend, index))
}

pub fn create_kv_table(table: &str) -> TableCreateStatement {
    Table::create()
        .table(Alias::new(table))
        .if_not_exists()
        .col(ColumnDef::new(Alias::new(KEY_COLUMN)).string_len(255).not_null().primary_key())
        .col(ColumnDef::new(Alias::new(VALUE_COLUMN)).text())
        .to_owned()
}

/// Values are stored as JSON text; anything that does not parse is returned as a plain string.
pub fn encode_value(value: &Value) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

pub fn decode_value(column: Option<&Value>) -> Value {
    match column {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(text)) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())),
        Some(other) => other.clone(),
    }
}
