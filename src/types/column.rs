// In: src/types/column.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of row-indexed columns the engine reads from a `ColumnStore`.
///
/// Serialized names are the canonical upper-case table column names, so a
/// configuration can list hot columns as `["DATA", "FLAG"]`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Column {
    Antenna1,
    Antenna2,
    ArrayId,
    FieldId,
    DataDescId,
    Time,
    Interval,
    Exposure,
    ScanNumber,
    FlagRow,
    Uvw,
    Sigma,
    Weight,
    Flag,
    WeightSpectrum,
    Data,
    ModelData,
    CorrectedData,
    FloatData,
}

impl Column {
    pub const ALL: [Column; 19] = [
        Column::Antenna1,
        Column::Antenna2,
        Column::ArrayId,
        Column::FieldId,
        Column::DataDescId,
        Column::Time,
        Column::Interval,
        Column::Exposure,
        Column::ScanNumber,
        Column::FlagRow,
        Column::Uvw,
        Column::Sigma,
        Column::Weight,
        Column::Flag,
        Column::WeightSpectrum,
        Column::Data,
        Column::ModelData,
        Column::CorrectedData,
        Column::FloatData,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Column::Antenna1 => "ANTENNA1",
            Column::Antenna2 => "ANTENNA2",
            Column::ArrayId => "ARRAY_ID",
            Column::FieldId => "FIELD_ID",
            Column::DataDescId => "DATA_DESC_ID",
            Column::Time => "TIME",
            Column::Interval => "INTERVAL",
            Column::Exposure => "EXPOSURE",
            Column::ScanNumber => "SCAN_NUMBER",
            Column::FlagRow => "FLAG_ROW",
            Column::Uvw => "UVW",
            Column::Sigma => "SIGMA",
            Column::Weight => "WEIGHT",
            Column::Flag => "FLAG",
            Column::WeightSpectrum => "WEIGHT_SPECTRUM",
            Column::Data => "DATA",
            Column::ModelData => "MODEL_DATA",
            Column::CorrectedData => "CORRECTED_DATA",
            Column::FloatData => "FLOAT_DATA",
        }
    }

    /// Looks a column up by its canonical table name.
    pub fn from_name(name: &str) -> Option<Column> {
        Column::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    /// Columns with a channel axis. Reads of these honour the active channel slice.
    pub const fn is_channelized(self) -> bool {
        matches!(
            self,
            Column::Flag
                | Column::WeightSpectrum
                | Column::Data
                | Column::ModelData
                | Column::CorrectedData
                | Column::FloatData
        )
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip_through_lookup_and_serde() {
        for column in Column::ALL {
            assert_eq!(Column::from_name(column.as_str()), Some(column));
            let json = serde_json::to_string(&column).unwrap();
            assert_eq!(json, format!("\"{}\"", column.as_str()));
        }
        assert_eq!(Column::from_name("NOT_A_COLUMN"), None);
    }

    #[test]
    fn test_only_spectral_columns_are_channelized() {
        assert!(Column::Data.is_channelized());
        assert!(Column::Flag.is_channelized());
        assert!(!Column::Uvw.is_channelized());
        assert!(!Column::Weight.is_channelized());
    }
}
