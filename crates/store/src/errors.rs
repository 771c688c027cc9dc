use thiserror::Error;

/// Every failure the store reports. Each variant names what was expected and why it failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("configuration error: {message}")]
    Configuration { expected: String, message: String },
    #[error("validation error: {message}")]
    Validation { expected: String, message: String },
    #[error("type mismatch: {message}")]
    TypeMismatch { expected: String, message: String },
    #[error("io error: {message}")]
    Io { expected: String, message: String },
    #[error("database error: {message}")]
    Database { expected: String, message: String },
    #[error("serialization error: {message}")]
    Serialization { expected: String, message: String },
}

impl StoreError {
    pub fn configuration(expected: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration { expected: expected.into(), message: message.into() }
    }

    pub fn validation(expected: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { expected: expected.into(), message: message.into() }
    }

    pub fn type_mismatch(expected: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch { expected: expected.into(), message: message.into() }
    }

    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::Io { expected: "readable and writable file".into(), message: err.to_string() }
    }

    pub fn db(err: impl std::fmt::Display) -> Self {
        Self::Database { expected: "successful round-trip".into(), message: err.to_string() }
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization { expected: "JSON document".into(), message: err.to_string() }
    }

    /// What the failing operation anticipated (a type name, an option, a resource).
    pub fn expected(&self) -> &str {
        match self {
            StoreError::Configuration { expected, .. }
            | StoreError::Validation { expected, .. }
            | StoreError::TypeMismatch { expected, .. }
            | StoreError::Io { expected, .. }
            | StoreError::Database { expected, .. }
            | StoreError::Serialization { expected, .. } => expected,
        }
    }

    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            StoreError::Configuration { .. } => 1001,
            StoreError::Validation { .. } => 1002,
            StoreError::TypeMismatch { .. } => 1003,
            StoreError::Io { .. } => 1101,
            StoreError::Serialization { .. } => 1102,
            StoreError::Database { .. } => 1200,
        }
    }
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(e: sea_orm::DbErr) -> Self {
        StoreError::db(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::serialization(e)
    }
}

/// Name of the JSON type of `value`, as used in error messages.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
