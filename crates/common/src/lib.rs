use thiserror::Error;

pub mod utils;
pub mod env;
pub mod updater;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
}
