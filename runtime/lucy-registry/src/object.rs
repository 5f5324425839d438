//! Registry of heterogeneous host objects with typed lookup.
//!
//! The binding keeps one registry for every kind of object it lends to the
//! native library (compiled patterns for tokenizers, callbacks, and so on)
//! and recovers the concrete type when a native callback hands the handle
//! back.

use std::any::{Any, type_name};
use std::sync::Arc;

use thiserror::Error;

use crate::{Handle, Registry};

pub type SharedObject = Arc<dyn Any + Send + Sync>;

pub type ObjectRegistry = Registry<SharedObject>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no live object registered under handle {0}")]
    Missing(Handle),
    #[error("object registered under handle {handle} is not a {expected}")]
    WrongType {
        handle: Handle,
        expected: &'static str,
    },
}

impl Registry<SharedObject> {
    pub fn store_object<V>(&self, value: V) -> Handle
    where
        V: Any + Send + Sync,
    {
        self.store(Arc::new(value))
    }

    pub fn store_shared<V>(&self, value: Arc<V>) -> Handle
    where
        V: Any + Send + Sync,
    {
        self.store(value)
    }

    /// Fetch the object under `handle` as a `V`.
    pub fn fetch_as<V>(&self, handle: Handle) -> Result<Arc<V>, FetchError>
    where
        V: Any + Send + Sync,
    {
        let object = self.fetch(handle).ok_or(FetchError::Missing(handle))?;
        object.downcast::<V>().map_err(|_| FetchError::WrongType {
            handle,
            expected: type_name::<V>(),
        })
    }
}
