//! Reader and exporter for particle-based (SPH) simulation snapshots.
//!
//! ```text
//!   dump file ──► SnapshotReader<E: Engine> ──► Dataset ──► table()     Arrow / Parquet / CSV
//!                  (negotiate, fill, labels,               hierarchy() header/, sinks/, particles/
//!                   header; one lock)                                  JSON / HDF5
//! ```
//!
//! ```no_run
//! use splash_dump::{engine::TextEngine, ReadOptions, SnapshotReader};
//!
//! let reader = SnapshotReader::new(TextEngine::new());
//! let dump = reader.read("sample_dump.csv", &ReadOptions::new("csv"))?;
//! println!("{dump}");
//! dump.save_json("sample_dump.json".as_ref())?;
//! # Ok::<(), splash_dump::SnapshotError>(())
//! ```

pub mod data;
pub mod engine;
pub mod error;
pub mod export;
pub mod read;

pub use data::model::{Dataset, Headers, Source};
pub use data::partition::{partition, partition_by, CategoryPredicate, Partition};
pub use error::{Result, SnapshotError};
pub use export::{ExportPolicy, ExportTree};
pub use read::{ReadOptions, Shape, SnapshotReader, CATEGORY_LABEL};
