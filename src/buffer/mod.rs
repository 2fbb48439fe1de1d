//! The attached cache: lazily derived per-RowGroup fields with per-field
//! validity, plus the derived-column transforms that operate on them.
//!
//! - `fields`: the static descriptor table and typed field slots.
//! - `fillers`: one derivation function per field.
//! - `cache`: `VisCache` itself; attachment, validity, copy and setters.
//! - `transforms`: channel averaging, Stokes forming and correlation sorting.

pub mod cache;
pub mod fields;
mod fillers;
pub mod transforms;


pub use cache::VisCache;
pub use fields::{CacheField, CacheValues};
pub use transforms::AverageMode;
