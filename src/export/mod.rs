//! Hierarchical export: a dataset split into named groups of fields.
//!
//! ```text
//!   Dataset ──► ExportPolicy::apply ──► partition on category column
//!                                            │
//!                                            ▼
//!                          export(dataset, categories, bundles)
//!                                            │
//!                                            ▼
//!                         ExportTree  header/ ── tag: scalar
//!                                     sinks/  ── xyz: N×3, h: N, …
//!                                     particles/
//!                                            │
//!                                  write_json │ write_hdf5
//! ```

pub mod policy;
pub mod tree;

#[cfg(feature = "hdf5")]
pub mod hdf5;

pub use policy::{Bundle, CategoryGroup, ExportPolicy, DEFAULT_IEOS, POLICY_NAMES, SINK_TYPE};
pub use tree::{export, CategoryRows, Export, ExportTree, ExportWarning, Field, Group, HEADER_GROUP};

use std::path::Path;

use crate::data::model::Dataset;
use crate::error::Result;

impl Dataset {
    /// Write [`Dataset::hierarchy`] as JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        self.hierarchy().tree.write_json(path)
    }
}
