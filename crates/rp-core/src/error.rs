//! Unified Error Model for pipeline construction and context access
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key {key} does not hold a {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("a chain needs at least one stage")]
    Empty,
}
