//! fleetgrid-state — embedded state store for FleetGrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state for the fleet directory (application records), the platform
//! version status and the upgrade settings that parameterize the upgrader.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Applications are keyed `{tenant}/{application}`. Each upgrade setting
//! lives under its own key in the `settings` table so the knobs can be read
//! and written independently.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. Clones share one [`LockTable`], so
//! named locks taken through any clone exclude each other.

pub mod error;
pub mod lock;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use lock::{LockTable, StoreLock};
pub use store::StateStore;
pub use types::*;
