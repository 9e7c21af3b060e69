//! # Offline Cache
//!
//! Keeps a local copy of every remote track that actually started playing so
//! the control server can offer it back as `playlistLocal` later.
//!
//! ## Layout
//!
//! ```text
//! <root>/<group>/<name>          finished file
//! <root>/<group>/.<name>.part    download in progress
//! ```
//!
//! `group` is one path segment of the track URL (the playlist or pharmacy
//! id). Writes go to the partial file first and are renamed into place, so a
//! file at its final path is always complete.
//!
//! ## Lifecycle
//!
//! - [`CacheStore::sweep`] runs once at startup, before anything plays.
//! - [`CacheStore::store_if_eligible`] runs in the background after each
//!   confirmed remote track start.

mod config;
mod stats;
mod store;
mod sweep;

pub use config::{CacheConfig, RetentionPolicy};
pub use stats::{CacheStats, CachedFile};
pub use store::{CacheOutcome, CacheStore, SkipReason};
pub use sweep::SweepReport;
