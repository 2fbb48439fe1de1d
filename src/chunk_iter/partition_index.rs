// In: src/chunk_iter/partition_index.rs

use std::ops::Range;

use crate::error::{Result, VisIterError};
use crate::store::ColumnStore;
use crate::types::{Column, PartitionKey};

/// One outer chunk: a maximal contiguous row run sharing a partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub key: PartitionKey,
    pub rows: Range<usize>,
}

/// The chunk boundaries of one store, computed once from its key columns.
#[derive(Debug, Clone, Default)]
pub struct PartitionIndex {
    spans: Vec<ChunkSpan>,
}

fn to_id(column: Column, value: i32) -> Result<usize> {
    usize::try_from(value).map_err(|_| VisIterError::ColumnRead {
        column: column.as_str(),
        reason: format!("negative id {value}"),
    })
}

impl PartitionIndex {
    /// Scans the key columns. When `interval` is set a run is also split each
    /// time the row time reaches `interval` seconds past the run's first row.
    pub fn build(store: &dyn ColumnStore, interval: Option<f64>) -> Result<Self> {
        let n = store.row_count();
        if n == 0 {
            return Ok(Self::default());
        }
        let arrays = store.read_range(Column::ArrayId, 0..n, None)?.into_int(Column::ArrayId)?;
        let fields = store.read_range(Column::FieldId, 0..n, None)?.into_int(Column::FieldId)?;
        let ddids = store
            .read_range(Column::DataDescId, 0..n, None)?
            .into_int(Column::DataDescId)?;
        let times = store.read_range(Column::Time, 0..n, None)?.into_float64(Column::Time)?;

        let mut spans: Vec<ChunkSpan> = Vec::new();
        let mut run_start_time = 0.0;
        for row in 0..n {
            let key = PartitionKey {
                array_id: to_id(Column::ArrayId, arrays[row])?,
                field_id: to_id(Column::FieldId, fields[row])?,
                data_desc_id: to_id(Column::DataDescId, ddids[row])?,
            };
            let split = match spans.last() {
                None => true,
                Some(span) if span.key != key => true,
                Some(_) => interval.is_some_and(|dt| times[row] - run_start_time >= dt),
            };
            if split {
                spans.push(ChunkSpan { key, rows: row..row + 1 });
                run_start_time = times[row];
            } else if let Some(span) = spans.last_mut() {
                span.rows.end = row + 1;
            }
        }
        Ok(Self { spans })
    }

    pub fn spans(&self) -> &[ChunkSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Total rows carrying `key`.
    pub fn row_count(&self, key: &PartitionKey) -> usize {
        self.spans
            .iter()
            .filter(|span| &span.key == key)
            .map(|span| span.rows.len())
            .sum()
    }
}
