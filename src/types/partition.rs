// In: src/types/partition.rs

use serde::{Deserialize, Serialize};

/// The coarse grouping attribute defining the boundaries of an outer chunk.
///
/// Rows are assumed pre-sorted by this key and then by time. The engine relies
/// on that ordering and does not enforce it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub array_id: usize,
    pub field_id: usize,
    pub data_desc_id: usize,
}

/// The physical channels read for one output channel group.
///
/// Covers `width` channels beginning at `start`, `stride` apart.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSlice {
    pub start: usize,
    pub width: usize,
    pub stride: usize,
}

impl ChannelSlice {
    pub fn new(start: usize, width: usize, stride: usize) -> Self {
        Self {
            start,
            width,
            stride: stride.max(1),
        }
    }

    /// The physical channel indices selected by this slice, in order.
    pub fn channel_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.width).map(move |i| self.start + i * self.stride)
    }

    /// The last physical channel touched, or `None` for an empty slice.
    pub fn last_channel(&self) -> Option<usize> {
        if self.width == 0 {
            None
        } else {
            Some(self.start + (self.width - 1) * self.stride)
        }
    }

    /// One past the last physical channel touched.
    pub fn end(&self) -> usize {
        self.last_channel().map_or(self.start, |last| last + 1)
    }

    /// `end`, or `None` if it is not representable.
    pub fn checked_end(&self) -> Option<usize> {
        match self.width {
            0 => Some(self.start),
            width => (width - 1)
                .checked_mul(self.stride)?
                .checked_add(self.start)?
                .checked_add(1),
        }
    }
}

/// Identifies one RowGroup: the chunk ordinal and the step within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubChunkId {
    pub chunk: usize,
    pub sub_chunk: usize,
}

/// Selects one of the complex visibility cubes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataColumn {
    #[default]
    Observed,
    Model,
    Corrected,
}
