// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the fabric.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum HiveLinkError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection attempt already in progress")]
    AlreadyBusy,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for HiveLinkError {
    fn clone(&self) -> Self {
        match self {
            HiveLinkError::Io(e) => HiveLinkError::Io(Arc::clone(e)),
            HiveLinkError::Protocol(s) => HiveLinkError::Protocol(s.clone()),
            HiveLinkError::Transport(s) => HiveLinkError::Transport(s.clone()),
            HiveLinkError::Unauthenticated(s) => HiveLinkError::Unauthenticated(s.clone()),
            HiveLinkError::NotFound(s) => HiveLinkError::NotFound(s.clone()),
            HiveLinkError::AlreadyBusy => HiveLinkError::AlreadyBusy,
            HiveLinkError::Validation(s) => HiveLinkError::Validation(s.clone()),
            HiveLinkError::Persistence(s) => HiveLinkError::Persistence(s.clone()),
            HiveLinkError::Timeout(s) => HiveLinkError::Timeout(s.clone()),
            HiveLinkError::Internal(s) => HiveLinkError::Internal(s.clone()),
        }
    }
}

impl PartialEq for HiveLinkError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HiveLinkError::Io(e1), HiveLinkError::Io(e2)) => e1.to_string() == e2.to_string(),
            (HiveLinkError::Protocol(s1), HiveLinkError::Protocol(s2)) => s1 == s2,
            (HiveLinkError::Transport(s1), HiveLinkError::Transport(s2)) => s1 == s2,
            (HiveLinkError::Unauthenticated(s1), HiveLinkError::Unauthenticated(s2)) => s1 == s2,
            (HiveLinkError::NotFound(s1), HiveLinkError::NotFound(s2)) => s1 == s2,
            (HiveLinkError::Validation(s1), HiveLinkError::Validation(s2)) => s1 == s2,
            (HiveLinkError::Persistence(s1), HiveLinkError::Persistence(s2)) => s1 == s2,
            (HiveLinkError::Timeout(s1), HiveLinkError::Timeout(s2)) => s1 == s2,
            (HiveLinkError::Internal(s1), HiveLinkError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for HiveLinkError {
    fn from(e: std::io::Error) -> Self {
        HiveLinkError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for HiveLinkError {
    fn from(e: serde_json::Error) -> Self {
        HiveLinkError::Protocol(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<sqlx::Error> for HiveLinkError {
    fn from(e: sqlx::Error) -> Self {
        HiveLinkError::Persistence(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for HiveLinkError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        HiveLinkError::Timeout("operation deadline exceeded".to_string())
    }
}
