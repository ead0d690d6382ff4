//! Read pipeline: negotiate the buffer, resolve metadata, build a Dataset.
//!
//! ```text
//!   path, format
//!        │
//!        ▼
//!   ┌──────────┐  Sizing ──► Filling
//!   │  loader   │  two read_data calls → buffer[npart × ncol]
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ metadata  │  labels (80-byte slots), header tags (16-byte slots)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  reader   │  one lock around all of it → Dataset
//!   └──────────┘
//! ```

pub mod codec;
pub mod loader;
pub mod metadata;
pub mod reader;

pub use codec::{FixedWidth, LABEL_WIDTH, TAG_WIDTH};
pub use loader::{load, LoadedBuffer, Shape};
pub use metadata::{resolve_headers, resolve_labels};
pub use reader::{ReadOptions, SnapshotReader};

/// Label of the trailing particle-type column every snapshot carries.
pub const CATEGORY_LABEL: &str = "itype";
