use std::sync::Arc;

use crate::chunk_iter::cursor::{ChunkCursor, CursorState};
use crate::chunk_iter::selection::ChannelSelection;
use crate::config::{IteratorConfig, RowGrouping};
use crate::error::VisIterError;
use crate::frequency::{DopplerConvention, FrequencyFrame, StaticMeasures, VelocitySelection};
use crate::store::{ColumnData, ColumnStore, MemoryStore};
use crate::test_utils::{default_config, StoreBuilder};
use crate::types::{ChannelSlice, Column, PartitionKey, SubChunkId};

// Test Helpers
/// Runs the full two-level loop, recording `(chunk key, row group, channel slice)`.
fn walk(cursor: &mut ChunkCursor) -> Vec<(PartitionKey, std::ops::Range<usize>, ChannelSlice)> {
    let mut visits = Vec::new();
    cursor.origin_chunks().unwrap();
    while cursor.more_chunks() {
        cursor.origin().unwrap();
        while cursor.more() {
            visits.push((
                cursor.current_key().unwrap(),
                cursor.row_group().unwrap(),
                cursor.channel_slice().unwrap(),
            ));
            cursor.advance().unwrap();
        }
        cursor.next_chunk().unwrap();
    }
    visits
}

fn cursor_for(store: MemoryStore) -> ChunkCursor {
    ChunkCursor::with_store(store, default_config()).unwrap()
}

#[test]
fn test_two_partitions_yield_two_chunks_of_one_row_group() {
    // Arrange: 2 partitions x 10 rows, one window each, 4 channels, uniform time.
    let store = StoreBuilder::new(4)
        .windows(2)
        .partition(0, 0, 10)
        .partition(0, 1, 10)
        .build();
    let mut cursor = cursor_for(store);

    // Act
    let visits = walk(&mut cursor);

    // Assert
    assert_eq!(visits.len(), 2);
    assert_eq!(visits[0].1, 0..10);
    assert_eq!(visits[1].1, 10..20);
    assert_eq!(visits[0].0.data_desc_id, 0);
    assert_eq!(visits[1].0.data_desc_id, 1);
    for (_, _, slice) in &visits {
        assert_eq!(*slice, ChannelSlice::new(0, 4, 1));
    }
    assert_eq!(cursor.state(), CursorState::Exhausted);
}

#[test]
fn test_two_channel_groups_produce_two_row_groups_per_chunk() {
    // Arrange: 8-channel window, {start=0, width=2, stride=1, groups=2}.
    let store = StoreBuilder::new(8).partition(0, 0, 5).partition(1, 0, 5).build();
    let mut cursor = cursor_for(store);
    cursor
        .select_channel(0, ChannelSelection::new(0, 2, 1, 2))
        .unwrap();

    // Act
    let visits = walk(&mut cursor);

    // Assert
    let slices: Vec<_> = visits.iter().map(|v| (v.1.clone(), v.2)).collect();
    assert_eq!(
        slices,
        vec![
            (0..5, ChannelSlice::new(0, 2, 1)),
            (0..5, ChannelSlice::new(2, 2, 1)),
            (5..10, ChannelSlice::new(0, 2, 1)),
            (5..10, ChannelSlice::new(2, 2, 1)),
        ]
    );
}

#[test]
fn test_row_groups_follow_timestamps_and_blocking() {
    // Arrange
    let times = [1.0, 1.0, 2.0, 2.0, 2.0, 3.0];
    let store = StoreBuilder::new(2).partition_with_times(0, 0, &times).build();
    let mut cursor = cursor_for(store);

    // Act / Assert: by timestamp.
    let rows: Vec<_> = walk(&mut cursor).into_iter().map(|v| v.1).collect();
    assert_eq!(rows, vec![0..2, 2..5, 5..6]);

    // Act / Assert: blocked by four rows.
    cursor.set_row_blocking(Some(4));
    let rows: Vec<_> = walk(&mut cursor).into_iter().map(|v| v.1).collect();
    assert_eq!(rows, vec![0..4, 4..6]);
}

#[test]
fn test_blocked_grouping_from_config() {
    let store = StoreBuilder::new(2).partition(0, 0, 10).build();
    let config = IteratorConfig {
        row_grouping: RowGrouping::Blocked { rows: 4 },
        ..IteratorConfig::default()
    };
    let mut cursor = ChunkCursor::with_store(store, Arc::new(config)).unwrap();
    let rows: Vec<_> = walk(&mut cursor).into_iter().map(|v| v.1).collect();
    assert_eq!(rows, vec![0..4, 4..8, 8..10]);
}

#[test]
fn test_sub_chunk_ids_and_counts() {
    // Arrange
    let store = StoreBuilder::new(4)
        .partition_with_times(0, 0, &[1.0, 2.0, 2.0])
        .partition(1, 0, 2)
        .build();
    let mut cursor = cursor_for(store);
    cursor.select_channel(0, ChannelSelection::new(0, 2, 1, 2)).unwrap();

    // Act
    cursor.origin_chunks().unwrap();
    let count = cursor.sub_chunk_count().unwrap();
    let mut ids = Vec::new();
    while cursor.more() {
        ids.push(cursor.sub_chunk_id().unwrap());
        cursor.advance().unwrap();
    }

    // Assert: two time runs times two channel groups.
    assert_eq!(count, 4);
    assert_eq!(ids.len(), 4);
    assert_eq!(ids[0], SubChunkId { chunk: 0, sub_chunk: 0 });
    assert_eq!(ids[3], SubChunkId { chunk: 0, sub_chunk: 3 });
    assert_eq!(cursor.sub_chunk_id(), None);

    cursor.next_chunk().unwrap();
    assert_eq!(cursor.sub_chunk_id(), Some(SubChunkId { chunk: 1, sub_chunk: 0 }));
}

#[test]
fn test_empty_store_fails_soft() {
    let mut cursor = cursor_for(StoreBuilder::new(4).build());
    cursor.origin_chunks().unwrap();
    assert!(!cursor.more_chunks());
    assert!(!cursor.more());
    cursor.next_chunk().unwrap();
    cursor.advance().unwrap();
    assert!(matches!(cursor.origin(), Err(VisIterError::NotPositioned)));
    assert!(matches!(cursor.row_group(), Err(VisIterError::NotPositioned)));
}

#[test]
fn test_selection_errors_are_reported_at_selection_time() {
    // Arrange
    let store = StoreBuilder::new(8).partition(0, 0, 2).build();
    let mut cursor = cursor_for(store);

    // Act / Assert
    assert!(matches!(
        cursor.select_channel(0, ChannelSelection::new(6, 2, 1, 2)),
        Err(VisIterError::ChannelSelection { spw: 0, .. })
    ));
    assert!(matches!(
        cursor.select_channel(3, ChannelSelection::new(0, 2, 1, 1)),
        Err(VisIterError::UnknownSpectralWindow(3))
    ));
    assert!(matches!(
        cursor.select_channel(0, ChannelSelection::new(usize::MAX - 1, 2, 1, 2)),
        Err(VisIterError::ChannelSelection { spw: 0, .. })
    ));
    // A failed selection leaves the table untouched.
    assert_eq!(cursor.is_selection_defaulted(0, 0), None);
    assert_eq!(walk(&mut cursor)[0].2, ChannelSlice::new(0, 8, 1));
}

#[test]
fn test_lazy_defaults_are_queryable_and_depend_on_iteration_order() {
    // Arrange
    let store = StoreBuilder::new(4)
        .windows(2)
        .partition(0, 0, 2)
        .partition(0, 1, 2)
        .build();
    let mut cursor = cursor_for(store);

    // Act
    cursor.origin_chunks().unwrap();

    // Assert: only the window reached so far has an entry.
    assert_eq!(cursor.is_selection_defaulted(0, 0), Some(true));
    assert_eq!(cursor.is_selection_defaulted(0, 1), None);

    cursor.next_chunk().unwrap();
    assert_eq!(cursor.is_selection_defaulted(0, 1), Some(true));
    assert_eq!(cursor.channel_selection(0).len(), 2);
}

#[test]
fn test_selection_changes_apply_at_next_origin_and_last_write_wins() {
    // Arrange
    let store = StoreBuilder::new(8).partition(0, 0, 4).build();
    let mut cursor = cursor_for(store);
    cursor.select_channel(0, ChannelSelection::new(0, 4, 1, 1)).unwrap();
    cursor.origin_chunks().unwrap();
    assert_eq!(cursor.channel_slice().unwrap(), ChannelSlice::new(0, 4, 1));

    // Act: two selections after iteration started.
    cursor.select_channel(0, ChannelSelection::new(2, 2, 1, 1)).unwrap();
    cursor.select_channel(0, ChannelSelection::new(4, 4, 1, 1)).unwrap();

    // Assert: the active chunk keeps its slice until origin().
    assert_eq!(cursor.channel_slice().unwrap(), ChannelSlice::new(0, 4, 1));
    cursor.origin().unwrap();
    assert_eq!(cursor.channel_slice().unwrap(), ChannelSlice::new(4, 4, 1));
    assert_eq!(cursor.is_selection_defaulted(0, 0), Some(false));
}

#[test]
fn test_explicit_selection_replaces_a_default() {
    let store = StoreBuilder::new(8).partition(0, 0, 4).build();
    let mut cursor = cursor_for(store);
    cursor.origin_chunks().unwrap();
    assert_eq!(cursor.is_selection_defaulted(0, 0), Some(true));

    cursor.select_channel(0, ChannelSelection::new(1, 3, 2, 1)).unwrap();
    cursor.origin_chunks().unwrap();
    assert_eq!(cursor.channel_slice().unwrap(), ChannelSlice::new(1, 3, 2));
    assert_eq!(cursor.is_selection_defaulted(0, 0), Some(false));
}

#[test]
fn test_unselected_windows_are_skipped_when_configured() {
    // Arrange: windows 0, 1, 0; only window 1 is selected.
    let store = StoreBuilder::new(4)
        .windows(2)
        .partition(0, 0, 2)
        .partition(0, 1, 3)
        .partition(1, 0, 2)
        .build();
    let config = IteratorConfig {
        skip_unselected_windows: true,
        ..IteratorConfig::default()
    };
    let mut cursor = ChunkCursor::with_store(store, Arc::new(config)).unwrap();
    cursor.select_channel(1, ChannelSelection::new(0, 2, 1, 1)).unwrap();

    // Act
    let visits = walk(&mut cursor);

    // Assert
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].1, 2..5);
}

#[test]
fn test_iteration_crosses_stores_and_retunes() {
    // Arrange
    let first = StoreBuilder::new(4)
        .id("first")
        .partition(0, 0, 3)
        .partition(1, 0, 3)
        .tile_rows(Column::Data, 16)
        .build();
    let second = StoreBuilder::new(4)
        .id("second")
        .partition(0, 0, 2)
        .tile_rows(Column::Data, 16)
        .build();
    let (p1, p2) = (first.probe(), second.probe());
    let stores: Vec<Box<dyn ColumnStore>> = vec![Box::new(first), Box::new(second)];
    let mut cursor =
        ChunkCursor::new(stores, default_config(), Box::new(StaticMeasures::new())).unwrap();

    // Act
    let mut store_indices = Vec::new();
    cursor.origin_chunks().unwrap();
    while cursor.more_chunks() {
        store_indices.push(cursor.store_index().unwrap());
        cursor.next_chunk().unwrap();
    }

    // Assert: the first store is tuned once (same ddid twice), the second once.
    assert_eq!(store_indices, vec![0, 0, 1]);
    assert_eq!(p1.clears_of(Column::Data), 1);
    assert_eq!(p2.clears_of(Column::Data), 1);
    assert_eq!(p2.budget_for(Column::Data).unwrap().anchor_row, 0);
}

#[test]
fn test_advisor_retunes_on_data_description_change() {
    let store = StoreBuilder::new(4)
        .windows(2)
        .partition(0, 0, 3)
        .partition(0, 1, 3)
        .tile_rows(Column::Flag, 2)
        .build();
    let probe = store.probe();
    let mut cursor = cursor_for(store);

    walk(&mut cursor);

    assert_eq!(probe.clears_of(Column::Flag), 2);
    assert_eq!(probe.budget_for(Column::Flag).unwrap().anchor_row, 3);
    let report = cursor.tuning_report().unwrap();
    assert_eq!(report.data_desc_id, 1);
}

#[test]
fn test_every_step_publishes_an_invalidation() {
    let store = StoreBuilder::new(4)
        .partition_with_times(0, 0, &[1.0, 2.0])
        .partition(1, 0, 1)
        .build();
    let mut cursor = cursor_for(store);
    let e0 = cursor.epoch();
    cursor.origin_chunks().unwrap();
    let e1 = cursor.epoch();
    cursor.advance().unwrap();
    let e2 = cursor.epoch();
    cursor.origin().unwrap();
    let e3 = cursor.epoch();
    cursor.next_chunk().unwrap();
    let e4 = cursor.epoch();
    assert!(e0 < e1 && e1 < e2 && e2 < e3 && e3 < e4);
}

#[test]
fn test_chunk_interval_splits_chunks() {
    let store = StoreBuilder::new(2)
        .partition_with_times(0, 0, &[0.0, 10.0, 20.0, 30.0])
        .build();
    let config = IteratorConfig {
        chunk_interval_seconds: Some(15.0),
        ..IteratorConfig::default()
    };
    let mut cursor = ChunkCursor::with_store(store, Arc::new(config)).unwrap();
    let mut chunks = Vec::new();
    cursor.origin_chunks().unwrap();
    while cursor.more_chunks() {
        chunks.push(cursor.chunk_rows().unwrap());
        cursor.next_chunk().unwrap();
    }
    assert_eq!(chunks, vec![0..2, 2..4]);
}

#[test]
fn test_chunk_times_and_intervals_cover_the_chunk() {
    let store = StoreBuilder::new(2)
        .partition_with_times(0, 0, &[5.0, 5.0, 6.0])
        .build();
    let mut cursor = cursor_for(store);
    cursor.origin_chunks().unwrap();
    assert_eq!(cursor.chunk_times().unwrap(), &[5.0, 5.0, 6.0]);
    assert_eq!(cursor.chunk_intervals().unwrap(), &[10.0, 10.0, 10.0]);
}

#[test]
fn test_frequencies_follow_channel_slice() {
    let store = StoreBuilder::new(8).partition(0, 0, 2).build();
    let mut cursor = cursor_for(store);
    cursor.select_channel(0, ChannelSelection::new(1, 3, 2, 1)).unwrap();
    cursor.origin_chunks().unwrap();

    assert_eq!(cursor.n_channels().unwrap(), 3);
    assert_eq!(cursor.channel_numbers().unwrap(), vec![1, 3, 5]);
    let expected: Vec<f64> = [1, 3, 5].iter().map(|&c| StoreBuilder::frequency(0, c)).collect();
    assert_eq!(cursor.frequencies().unwrap(), expected);
    // Static measures without an LSRK velocity leave frequencies unchanged.
    assert_eq!(cursor.lsr_frequencies().unwrap(), expected);
}

#[test]
fn test_velocity_selection_picks_covering_channels() {
    // Arrange: target frequencies between native channels 1..2 and 5..6.
    let store = StoreBuilder::new(8).partition(0, 0, 2).build();
    let mut cursor = cursor_for(store);
    let rest = 1.42e9;
    let v = |f: f64| DopplerConvention::Radio.velocity_from_ratio(f / rest);
    let selection = VelocitySelection {
        start: v(1.0015e9),
        increment: v(1.0035e9) - v(1.0015e9),
        channel_count: 3,
        convention: DopplerConvention::Radio,
        frame: FrequencyFrame::Topocentric,
        rest_frequency: None,
    };

    // Act
    cursor.select_velocity(selection).unwrap();
    cursor.origin_chunks().unwrap();

    // Assert
    assert_eq!(cursor.channel_slice().unwrap(), ChannelSlice::new(1, 6, 1));
    assert_eq!(cursor.n_channels().unwrap(), 3);
    let freqs = cursor.frequencies().unwrap();
    for (f, expected) in freqs.iter().zip([1.0015e9, 1.0035e9, 1.0055e9]) {
        assert!((f - expected).abs() < 1e-3);
    }
    assert_eq!(cursor.sub_chunk_count().unwrap(), 1);
    assert!(cursor.resample_plan().unwrap().is_some());

    // Clearing restores the channel selection at the next origin.
    cursor.clear_velocity_selection();
    cursor.origin().unwrap();
    assert_eq!(cursor.channel_slice().unwrap(), ChannelSlice::new(0, 8, 1));
    assert!(cursor.velocity_grids().is_none());
}

#[test]
fn test_velocity_selection_outside_window_is_rejected_at_origin() {
    let store = StoreBuilder::new(4).partition(0, 0, 2).build();
    let mut cursor = cursor_for(store);
    cursor
        .select_velocity(VelocitySelection {
            start: 0.0,
            increment: 1.0,
            channel_count: 2,
            convention: DopplerConvention::Radio,
            frame: FrequencyFrame::Topocentric,
            rest_frequency: Some(5.0e9),
        })
        .unwrap();
    assert!(matches!(
        cursor.origin_chunks(),
        Err(VisIterError::VelocitySelection(_))
    ));
}

#[test]
fn test_windows_of_different_widths_share_one_store() {
    // Arrange: a 4-channel window, an 8-channel window, then the first again.
    let store = StoreBuilder::new(4)
        .window_channels(&[4, 8])
        .partition(0, 0, 2)
        .partition(0, 1, 3)
        .partition(1, 0, 2)
        .build();
    let mut cursor = cursor_for(store);

    // Act
    let mut shapes = Vec::new();
    cursor.origin_chunks().unwrap();
    while cursor.more_chunks() {
        cursor.origin().unwrap();
        while cursor.more() {
            let data = cursor.read_column(Column::Data).unwrap();
            shapes.push((cursor.n_channels().unwrap(), data.shape()));
            cursor.advance().unwrap();
        }
        cursor.next_chunk().unwrap();
    }

    // Assert
    assert_eq!(
        shapes,
        vec![(4, vec![2, 4, 2]), (8, vec![2, 8, 3]), (4, vec![2, 4, 2])]
    );
    assert_eq!(cursor.channel_selection(0).len(), 2);
}

#[test]
fn test_put_column_writes_to_current_row_group_and_slice() {
    // Arrange
    let store = StoreBuilder::new(4).partition_with_times(0, 0, &[1.0, 2.0]).build();
    let mut cursor = cursor_for(store);
    cursor.select_channel(0, ChannelSelection::new(2, 2, 1, 1)).unwrap();
    cursor.origin_chunks().unwrap();
    cursor.advance().unwrap();

    // Act
    let flags = ndarray::Array3::from_elem((2, 2, 1), true);
    cursor.put_column(Column::Flag, ColumnData::BoolCube(flags)).unwrap();

    // Assert
    let all = cursor
        .store(0)
        .unwrap()
        .read_range(Column::Flag, 0..2, None)
        .unwrap()
        .into_bool_cube(Column::Flag)
        .unwrap();
    assert!(all[[0, 2, 1]] && all[[1, 3, 1]]);
    assert!(!all[[0, 1, 1]] && !all[[0, 2, 0]]);
}

#[test]
fn test_broken_metadata_surfaces_and_is_retryable() {
    // Data description 1 does not exist in a one-window store.
    let store = StoreBuilder::new(4).partition(0, 1, 2).build();
    let mut cursor = cursor_for(store);
    assert!(matches!(
        cursor.origin_chunks(),
        Err(VisIterError::UnknownDataDescription(1))
    ));
    assert!(!cursor.more_chunks());
    assert_eq!(cursor.state(), CursorState::Unstarted);
}
