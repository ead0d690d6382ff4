//! Data layer: the normalised snapshot, its tabular view, and row
//! partitioning.
//!
//! ```text
//!   LoadedBuffer + labels + header
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  Dataset  │  ncol × npart, column-major, labels, Headers
//!   └──────────┘
//!        │                     │
//!        ▼                     ▼
//!   ┌──────────┐        ┌────────────┐
//!   │  table    │        │ partition   │  predicate on one column →
//!   └──────────┘        └────────────┘  matching / rest row indices
//!   Arrow RecordBatch,
//!   Parquet, CSV
//! ```

pub mod model;
pub mod partition;
pub mod table;
