//! Frequency-frame handling for the current chunk.
//!
//! `measures` holds the narrow contract to the external coordinate/measures
//! library together with exact doppler relations; `converter` turns a velocity
//! selection into the native and reference frequency grids for one chunk.

pub mod converter;
pub mod measures;

pub use converter::{ConversionContext, FrequencyConverter, FrequencyGrids, VelocitySelection};
pub use measures::{
    DopplerConvention, FrequencyFrame, Measures, Position, SkyDirection, StaticMeasures,
    SPEED_OF_LIGHT,
};
