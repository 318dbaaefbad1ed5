//! Backend abstraction and change detection for a template-driven
//! configuration renderer.
//!
//! A [`StoreClient`] fetches flattened key/value sets from etcd, Consul,
//! local documents, the process environment or an in-memory store, and
//! blocks until something under a watched prefix changes. Results land in a
//! [`SnapshotStore`] that the rendering engine queries concurrently.

mod backends;
mod config;
mod errors;
mod flatten;
mod store;

pub mod constants;
pub mod utils;

pub use backends::*;
pub use config::*;
pub use errors::*;
pub use flatten::*;
pub use store::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
