//! Read-only view of the external worker directory.

use std::fmt;

use async_trait::async_trait;

use super::WorkerId;
use crate::error::LedgerError;

/// Lookup into the worker records owned by another subsystem.
///
/// The ledger only reads through this trait; it never creates or edits
/// workers.
#[async_trait]
pub trait WorkerDirectory: Send + Sync + fmt::Debug {
    /// Returns the worker's display name, or `None` if no such worker exists.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the directory is unreachable.
    async fn worker_name(&self, worker_id: WorkerId) -> Result<Option<String>, LedgerError>;
}
