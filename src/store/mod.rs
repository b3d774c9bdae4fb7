//! Declarative object store seam.
//!
//! The store is the only source of truth and the only synchronization point
//! between concurrent convergence passes. Implementations provide atomic
//! create-if-absent: a losing create returns [`Error::AlreadyExists`], a
//! missing object returns [`Error::NotFound`], and anything else is a
//! [`Error::Store`] failure.
//!
//! [`Error::AlreadyExists`]: crate::error::Error::AlreadyExists
//! [`Error::NotFound`]: crate::error::Error::NotFound
//! [`Error::Store`]: crate::error::Error::Store

mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::resources::{ObjectKey, Resource};

pub use memory::{JournalEntry, MemoryStore};

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Look up an object by key.
    async fn get(&self, key: &ObjectKey) -> Result<Resource>;

    /// Create an object if no object with the same key exists.
    async fn create(&self, resource: Resource) -> Result<Resource>;
}
