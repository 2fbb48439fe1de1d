//! This module defines the core, shared data types used throughout the engine:
//! store column names, correlation products and the partition/selection
//! primitives that tie a chunk to a slice of the channel axis.

pub mod column;
pub mod corr_type;
pub mod partition;

pub use column::Column;
pub use corr_type::{CorrType, PolFrame};
pub use partition::{ChannelSlice, DataColumn, PartitionKey, SubChunkId};

/// Complex visibility sample as stored in the data cubes.
pub type Complex32 = num_complex::Complex<f32>;
