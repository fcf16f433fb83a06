//! Shared state of the batch pipeline: the persistent store, the lifecycle
//! status machine and the payload types exchanged with provers.

pub mod db;
pub mod error;
pub mod message;
pub mod models;
pub mod status;
pub mod trace;

pub use db::DataBase;
pub use error::StoreError;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
