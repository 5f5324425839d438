//! Handle registry for the Lucy host binding.
//!
//! Native search-engine objects cannot hold references into the managed
//! runtime. Instead the binding stores the managed value here and gives the
//! native side a pointer-sized [`Handle`] to keep in place of a pointer. The
//! handle is resolved with a lock-free [`Registry::fetch`] whenever native
//! code calls back, and retired with [`Registry::delete`] from the native
//! destructor.

mod config;
mod handle;
mod object;
mod registry;
mod stats;

pub use config::{DEFAULT_CAPACITY, MIN_CAPACITY, RegistryConfig};
pub use handle::Handle;
pub use object::{FetchError, ObjectRegistry, SharedObject};
pub use registry::Registry;
pub use stats::RegistryStats;
