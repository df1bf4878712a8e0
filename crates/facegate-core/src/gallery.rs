//! Gallery storage contract shared by the decision loop and enrollment.

use crate::descriptor::Descriptor;
use crate::types::Identity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage read failed: {0}")]
    Read(String),
    #[error("storage write failed: {0}")]
    Write(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Persistent store of enrolled identities plus the append-only audit log.
pub trait Gallery {
    /// Append a new identity and return its id. Duplicate names are allowed.
    fn add_identity(&mut self, name: &str, descriptor: &Descriptor) -> Result<i64, StorageError>;

    /// Snapshot of every enrolled identity, in insertion order.
    fn all_identities(&self) -> Result<Vec<Identity>, StorageError>;

    /// Append an access event. Callers treat failures as best-effort.
    fn log_event(&mut self, name: &str, description: &str) -> Result<(), StorageError>;

    /// Append an unresolved alert. Callers treat failures as best-effort.
    fn add_alert(&mut self, message: &str) -> Result<(), StorageError>;
}
