//! The key-value contract the topic log and the counter are built on.
//!
//! Implementations must make `compare_and_swap` atomic with respect to every
//! other call on the same key; the log's offset allocation is only as correct
//! as that guarantee.

mod memory;
mod remote;

pub use memory::MemoryKv;
pub use remote::RemoteKv;

use async_trait::async_trait;

use crate::error::KvError;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fails with [`KvError::NotFound`] if the key was never written.
    async fn read(&self, key: &str) -> Result<i64, KvError>;

    async fn write(&self, key: &str, value: i64) -> Result<(), KvError>;

    /// Sets `key` to `to` only if it currently holds `from`.
    ///
    /// A missing key fails with [`KvError::NotFound`] unless
    /// `create_if_missing` is set, in which case it is created with `to`.
    /// A present key holding anything but `from` fails with
    /// [`KvError::PreconditionFailed`].
    async fn compare_and_swap(
        &self,
        key: &str,
        from: i64,
        to: i64,
        create_if_missing: bool,
    ) -> Result<(), KvError>;

    /// Like [`KvStore::read`], with a missing key reported as `None`.
    async fn read_optional(&self, key: &str) -> Result<Option<i64>, KvError> {
        match self.read(key).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
