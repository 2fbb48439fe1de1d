//! This file is the root of the `visiter_cache` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of the library (`chunk_iter`,
//!     `buffer`, `kernels`, etc.) so the Rust compiler knows they exist.
//! 2.  Re-exporting the handful of types a consumer needs to drive an
//!     iteration: the cursor, the attached cache, the store contract and the
//!     configuration.
//!
//! A typical consumer loop:
//!
//! ```no_run
//! use visiter_cache::{ChunkCursor, IteratorConfig, MemoryStore, VisCache};
//! use std::sync::Arc;
//!
//! # fn main() -> visiter_cache::Result<()> {
//! let store = MemoryStore::new("obs");
//! let cursor = ChunkCursor::with_store(store, Arc::new(IteratorConfig::default()))?.into_shared();
//! let mut cache = VisCache::attached_to(&cursor);
//!
//! cursor.borrow_mut().origin_chunks()?;
//! while cursor.borrow().more_chunks() {
//!     cursor.borrow_mut().origin()?;
//!     while cursor.borrow().more() {
//!         let _vis = cache.vis_cube()?;
//!         cursor.borrow_mut().advance()?;
//!     }
//!     cursor.borrow_mut().next_chunk()?;
//! }
//! # Ok(())
//! # }
//! ```

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
mod observability; // Make macros available throughout the crate

pub mod buffer;
pub mod chunk_iter;
pub mod config;
pub mod error;
pub mod frequency;
pub mod kernels;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_utils;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use buffer::{AverageMode, CacheField, VisCache};
pub use chunk_iter::{ChannelSelection, ChunkCursor, CursorState, SharedCursor};
pub use config::IteratorConfig;
pub use error::{Result, VisIterError};
pub use frequency::{FrequencyConverter, Measures, StaticMeasures, VelocitySelection};
pub use observability::init_logging;
pub use store::{ColumnData, ColumnStore, MemoryStore};
pub use types::{Column, Complex32, CorrType};
