use std::path::PathBuf;

use crate::engine::Routine;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Everything that can go wrong while reading or exporting a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The input path does not exist. Checked before the engine is touched.
    #[error("snapshot file {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// The engine flagged a failure (`ierr == 1`) from one of its routines.
    #[error("engine routine `{routine}` failed while reading {}", .path.display())]
    Engine { routine: Routine, path: PathBuf },

    /// A caller-supplied enumerated option matched no known value.
    #[error("unrecognised {kind} `{value}`; expected one of: {expected}")]
    UnrecognizedOption {
        kind: &'static str,
        value: String,
        expected: String,
    },

    /// The engine reported a shape that cannot back a buffer, or one that
    /// disagrees with the allocation it was handed.
    #[error("engine reported an unusable shape: {0}")]
    ShapeMismatch(String),

    /// Dataset invariants violated at construction.
    #[error("invalid dataset layout: {0}")]
    InvalidLayout(String),

    #[error("column `{0}` not present in dataset")]
    MissingColumn(String),

    /// A fixed-width character block had the wrong size for its entries.
    #[error("fixed-width string block: {0}")]
    Encoding(String),

    /// The file handed to the HDF5 reader carries no HDF5 superblock.
    #[error("{} is not an HDF5 file", .0.display())]
    NotHdf5(PathBuf),

    /// A group or field name that cannot be stored as an HDF5 link name.
    #[error("{kind} name `{name}` cannot be written to HDF5")]
    InvalidName { kind: &'static str, name: String },

    /// The process-wide native engine handle is already held elsewhere.
    #[error("native engine is already in use by another reader")]
    EngineUnavailable,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "hdf5")]
    #[error(transparent)]
    Hdf5(#[from] hdf5::Error),
}

impl SnapshotError {
    pub(crate) fn unrecognized(kind: &'static str, value: &str, expected: &[&str]) -> Self {
        SnapshotError::UnrecognizedOption {
            kind,
            value: value.to_string(),
            expected: expected.join(" || "),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SnapshotError>;
