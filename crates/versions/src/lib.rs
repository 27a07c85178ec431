//! Schema version ledger for the media database.
//!
//! The media database is shared by several features (offline downloads,
//! cache content metadata, cache file metadata, and anything external that
//! wants to piggyback on the same file). Each of them evolves its own tables
//! at its own pace, so the version of the containing database says nothing
//! useful. Instead each feature instance records its own version here, and
//! checks it on startup to decide whether its data needs migrating.
//!
//! # Architecture
//! - [`VersionLedger`] implements set/remove/get on top of a [`Store`],
//!   creating its table lazily and treating a missing table as "no version".
//! - [`Store`] is the small set of table primitives the ledger needs.
//!   [`SqliteStore`] is the real implementation; `MemoryStore` (behind the
//!   `mock` feature) is for tests.

pub mod error;
mod feature;
mod ledger;
mod models;
pub mod store;
mod table;

pub use crate::feature::Feature;
pub use crate::ledger::{StoreHandle, VersionLedger};
pub use crate::models::{VERSION_UNSET, VersionKey, VersionRecord};
#[cfg(any(test, feature = "mock"))]
pub use crate::store::MemoryStore;
pub use crate::store::{SqliteOptions, SqliteStore, Store};
pub use crate::table::{DEFAULT_TABLE_PREFIX, VersionTable};
