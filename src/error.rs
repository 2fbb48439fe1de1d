// In: src/error.rs

//! This module defines the single, unified error type for the iteration engine.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Variants are grouped the same way callers are expected to react to them:
//! configuration errors leave the cursor and cache in a well-defined state and can
//! be retried with corrected input, transient storage errors leave the requested
//! field invalid so the next access re-attempts the read.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisIterError {
    // =========================================================================
    // === Configuration Errors (bad input, detected eagerly where possible)
    // =========================================================================
    #[error("Invalid channel selection for spectral window {spw}: {reason}")]
    ChannelSelection { spw: usize, reason: String },

    #[error("Invalid velocity selection: {0}")]
    VelocitySelection(String),

    #[error("Invalid averaging bounds: {0}")]
    AveragingBounds(String),

    #[error("Required column '{0}' is not present in the store")]
    MissingColumn(&'static str),

    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("No cursor available to derive field '{0}'")]
    NoCursor(&'static str),

    #[error("The cursor is not positioned on a chunk")]
    NotPositioned,

    #[error("Insufficient correlations for this transform: {0}")]
    InsufficientCorrelations(String),

    #[error("Unsupported transform: {0}")]
    UnsupportedTransform(String),

    #[error("Cannot copy from a cache whose correlations are currently sorted")]
    CorrelationsSorted,

    #[error("Unknown spectral window id {0}")]
    UnknownSpectralWindow(usize),

    #[error("Unknown data description id {0}")]
    UnknownDataDescription(usize),

    #[error("Unknown polarization id {0}")]
    UnknownPolarization(usize),

    #[error("Unknown field id {0}")]
    UnknownField(usize),

    #[error("Unknown store index {0}")]
    UnknownStore(usize),

    #[error("Invalid row batch: {0}")]
    InvalidBatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // === Transient Storage Errors (the field stays invalid; retry re-reads)
    // =========================================================================
    #[error("Failed to read column '{column}': {reason}")]
    ColumnRead { column: &'static str, reason: String },

    #[error("Failed to write column '{column}': {reason}")]
    ColumnWrite { column: &'static str, reason: String },

    #[error("Type mismatch for column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the Arrow library.
    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An error from `ndarray` when a buffer cannot be viewed with the requested shape.
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// An error originating from the underlying I/O subsystem (e.g. the log file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically while loading a configuration.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, VisIterError>;

impl VisIterError {
    /// Returns `true` for errors raised by the storage layer that a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VisIterError::ColumnRead { .. } | VisIterError::ColumnWrite { .. } | VisIterError::Io(_)
        )
    }
}
