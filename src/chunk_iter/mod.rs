//! Chunked iteration over one or more column stores.
//!
//! - `partition_index`: chunk boundaries from the partition key columns.
//! - `selection`: per spectral window channel selection tables.
//! - `tile_cache`: read-ahead tuning on partition changes.
//! - `cursor`: the two-level chunk/RowGroup state machine.

pub mod cursor;
pub mod partition_index;
pub mod selection;
pub mod tile_cache;

#[cfg(test)]
mod cursor_tests;

pub use cursor::{ChunkCursor, CursorState, SharedCursor};
pub use partition_index::{ChunkSpan, PartitionIndex};
pub use selection::{ChannelSelection, SelectionEntry, SelectionOrigin, SelectionState};
pub use tile_cache::{SkipReason, TileCacheAdvisor, TuningOutcome, TuningReport};
