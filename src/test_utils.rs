// In: src/test_utils.rs

//! Deterministic store fixtures shared by the unit tests.

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::{Array2, Array3};
use std::sync::Arc;

use crate::chunk_iter::cursor::{ChunkCursor, SharedCursor};
use crate::config::IteratorConfig;
use crate::frequency::{FrequencyFrame, Position, SkyDirection};
use crate::store::{ColumnData, MemoryStore, RowBatch, SpectralWindowInfo};
use crate::types::{Column, Complex32, CorrType};

/// A batch holding only the partition key and time columns.
pub fn scalar_batch(arrays: &[i32], fields: &[i32], ddids: &[i32], times: &[f64]) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("ARRAY_ID", DataType::Int32, false),
        Field::new("FIELD_ID", DataType::Int32, false),
        Field::new("DATA_DESC_ID", DataType::Int32, false),
        Field::new("TIME", DataType::Float64, false),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int32Array::from(arrays.to_vec())) as ArrayRef,
            Arc::new(Int32Array::from(fields.to_vec())),
            Arc::new(Int32Array::from(ddids.to_vec())),
            Arc::new(Float64Array::from(times.to_vec())),
        ],
    )
    .unwrap()
}

pub fn default_config() -> Arc<IteratorConfig> {
    Arc::new(IteratorConfig::default())
}

pub fn shared_cursor(store: MemoryStore, config: Arc<IteratorConfig>) -> SharedCursor {
    ChunkCursor::with_store(store, config).unwrap().into_shared()
}

struct PartitionSpec {
    field_id: i32,
    data_desc_id: i32,
    times: Vec<f64>,
}

/// Builds a `MemoryStore` partition by partition, one append per partition.
pub struct StoreBuilder {
    id: String,
    n_chan: usize,
    windows: usize,
    window_chans: Vec<usize>,
    corrs: Vec<CorrType>,
    partitions: Vec<PartitionSpec>,
    tiles: Vec<(Column, usize)>,
    model: bool,
    corrected: bool,
    weight_spectrum: bool,
    float_data: bool,
}

impl StoreBuilder {
    pub fn new(n_chan: usize) -> Self {
        Self {
            id: "test".to_string(),
            n_chan,
            windows: 1,
            window_chans: Vec::new(),
            corrs: vec![CorrType::RR, CorrType::LL],
            partitions: Vec::new(),
            tiles: Vec::new(),
            model: false,
            corrected: false,
            weight_spectrum: false,
            float_data: false,
        }
    }

    /// The observed visibility of `(corr, chan)` at global row `row`.
    pub fn sample(corr: usize, chan: usize, row: usize) -> Complex32 {
        Complex32::new((100 * row + 10 * chan + corr) as f32, -(row as f32))
    }

    /// Native frequency of `chan` in window `spw`.
    pub fn frequency(spw: usize, chan: usize) -> f64 {
        1.0e9 + spw as f64 * 1.0e8 + chan as f64 * 1.0e6
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Number of spectral windows; data description `k` maps to window `k`.
    pub fn windows(mut self, windows: usize) -> Self {
        self.windows = windows;
        self
    }

    /// One window per entry, each with its own channel count.
    pub fn window_channels(mut self, chans: &[usize]) -> Self {
        self.windows = chans.len();
        self.window_chans = chans.to_vec();
        self
    }

    fn chans_of(&self, spw: usize) -> usize {
        self.window_chans.get(spw).copied().unwrap_or(self.n_chan)
    }

    pub fn corrs(mut self, corrs: Vec<CorrType>) -> Self {
        self.corrs = corrs;
        self
    }

    /// Appends `rows` rows sharing one timestamp.
    pub fn partition(self, field_id: usize, data_desc_id: usize, rows: usize) -> Self {
        let time = 100.0 * (self.partitions.len() + 1) as f64;
        self.partition_with_times(field_id, data_desc_id, &vec![time; rows])
    }

    pub fn partition_with_times(mut self, field_id: usize, data_desc_id: usize, times: &[f64]) -> Self {
        self.partitions.push(PartitionSpec {
            field_id: field_id as i32,
            data_desc_id: data_desc_id as i32,
            times: times.to_vec(),
        });
        self
    }

    pub fn tile_rows(mut self, column: Column, rows: usize) -> Self {
        self.tiles.push((column, rows));
        self
    }

    pub fn with_model(mut self) -> Self {
        self.model = true;
        self
    }

    pub fn with_corrected(mut self) -> Self {
        self.corrected = true;
        self
    }

    pub fn with_weight_spectrum(mut self) -> Self {
        self.weight_spectrum = true;
        self
    }

    pub fn with_float_data(mut self) -> Self {
        self.float_data = true;
        self
    }

    pub fn build(self) -> MemoryStore {
        let n_corr = self.corrs.len();
        let n_fields = self
            .partitions
            .iter()
            .map(|p| p.field_id as usize + 1)
            .max()
            .unwrap_or(1);

        let mut store = MemoryStore::new(self.id.clone())
            .with_position(Position { x: -1.6e6, y: -5.0e6, z: 3.5e6 })
            .with_polarization(self.corrs.clone());
        for spw in 0..self.windows {
            store = store
                .with_spectral_window(SpectralWindowInfo {
                    chan_freq: (0..self.chans_of(spw)).map(|c| Self::frequency(spw, c)).collect(),
                    rest_frequency: 1.42e9,
                    frame: FrequencyFrame::Topocentric,
                })
                .with_data_description(spw, 0);
        }
        for field in 0..n_fields {
            store = store.with_field(SkyDirection { ra: 0.1 * field as f64, dec: 0.5 });
        }
        for &(column, rows) in &self.tiles {
            store = store.with_tile_rows(column, rows);
        }

        let mut first_row = 0;
        for (index, partition) in self.partitions.iter().enumerate() {
            let batch = self.batch(index, partition, first_row, n_corr);
            store.append_rows(batch).unwrap();
            first_row += partition.times.len();
        }
        store
    }

    fn batch(&self, index: usize, partition: &PartitionSpec, first_row: usize, n_corr: usize) -> RowBatch {
        let n = partition.times.len();
        let rows: Vec<usize> = (first_row..first_row + n).collect();
        let n_chan = self.chans_of(partition.data_desc_id as usize);

        let schema = Schema::new(vec![
            Field::new("ANTENNA1", DataType::Int32, false),
            Field::new("ANTENNA2", DataType::Int32, false),
            Field::new("ARRAY_ID", DataType::Int32, false),
            Field::new("FIELD_ID", DataType::Int32, false),
            Field::new("DATA_DESC_ID", DataType::Int32, false),
            Field::new("SCAN_NUMBER", DataType::Int32, false),
            Field::new("TIME", DataType::Float64, false),
            Field::new("INTERVAL", DataType::Float64, false),
            Field::new("EXPOSURE", DataType::Float64, false),
            Field::new("FLAG_ROW", DataType::Boolean, false),
        ]);
        let scalars = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|&r| (r % 4) as i32))) as ArrayRef,
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|&r| (r % 4) as i32 + 1))),
                Arc::new(Int32Array::from(vec![0; n])),
                Arc::new(Int32Array::from(vec![partition.field_id; n])),
                Arc::new(Int32Array::from(vec![partition.data_desc_id; n])),
                Arc::new(Int32Array::from(vec![index as i32 + 1; n])),
                Arc::new(Float64Array::from(partition.times.clone())),
                Arc::new(Float64Array::from(vec![10.0; n])),
                Arc::new(Float64Array::from(vec![9.0; n])),
                Arc::new(BooleanArray::from(vec![false; n])),
            ],
        )
        .unwrap();

        let data = Array3::from_shape_fn((n_corr, n_chan, n), |(c, ch, r)| Self::sample(c, ch, rows[r]));
        let mut arrays = vec![
            (
                Column::Uvw,
                ColumnData::Float64Matrix(Array2::from_shape_fn((3, n), |(k, r)| {
                    (k + 1) as f64 * rows[r] as f64
                })),
            ),
            (Column::Sigma, ColumnData::Float32Matrix(Array2::from_elem((n_corr, n), 0.5))),
            (Column::Weight, ColumnData::Float32Matrix(Array2::from_elem((n_corr, n), 4.0))),
            (Column::Flag, ColumnData::BoolCube(Array3::from_elem((n_corr, n_chan, n), false))),
        ];
        if self.model {
            arrays.push((
                Column::ModelData,
                ColumnData::ComplexCube(Array3::from_elem((n_corr, n_chan, n), Complex32::new(1.0, 0.0))),
            ));
        }
        if self.corrected {
            arrays.push((Column::CorrectedData, ColumnData::ComplexCube(data.mapv(|v| v * 2.0))));
        }
        if self.weight_spectrum {
            arrays.push((
                Column::WeightSpectrum,
                ColumnData::Float32Cube(Array3::from_elem((n_corr, n_chan, n), 1.0)),
            ));
        }
        if self.float_data {
            arrays.push((Column::FloatData, ColumnData::Float32Cube(data.mapv(|v| v.re))));
        }
        arrays.push((Column::Data, ColumnData::ComplexCube(data)));

        RowBatch { scalars, arrays }
    }
}
