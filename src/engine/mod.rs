//! Engine boundary: the narrow call contract to whatever actually decodes
//! snapshot files.
//!
//! The engine is stateful. A successful `read_data` leaves the labels and
//! header of that file behind, and the `labels` / `header_sizes` /
//! `headers` calls read that state back. Nothing in here serialises
//! access; [`crate::read::SnapshotReader`] owns that discipline.
//!
//! ```text
//!   read_data(header_only = 1)   ──► npart, ncol
//!   read_data(header_only = 0)   ──► buffer[npart * ncol]
//!   get_labels(ncol - 1)         ──► [u8; 80] × (ncol - 1)
//!   get_header_vals_size         ──► ntags, nvals
//!   get_headers                  ──► [u8; 16] × ntags, f64 × nvals
//! ```
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, SnapshotError};

pub mod memory;
pub mod quiet;
pub mod text;

#[cfg(feature = "splash-ffi")]
pub mod ffi;

pub use memory::{MemoryEngine, MemorySnapshot};
pub use quiet::QuietScope;
pub use text::TextEngine;

#[cfg(feature = "splash-ffi")]
pub use ffi::SplashLib;

// ---------------------------------------------------------------------------
// Status flag
// ---------------------------------------------------------------------------

/// Integer status every engine routine hands back. `1` is failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct EngineStatus(pub i32);

impl EngineStatus {
    pub const OK: EngineStatus = EngineStatus(0);
    pub const FAILED: EngineStatus = EngineStatus(1);

    pub fn is_failure(self) -> bool {
        self.0 == 1
    }

    /// Turn the status into a typed failure naming the routine and file.
    /// Outputs of a failed call are undefined and must not be read.
    pub fn check(self, routine: Routine, path: &Path) -> Result<()> {
        if self.is_failure() {
            log::debug!("engine routine {routine} returned status {}", self.0);
            return Err(SnapshotError::Engine {
                routine,
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// Names of the engine routines, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    /// `read_data` with the header-only flag set.
    Discover,
    /// `read_data` filling the buffer.
    Fill,
    Labels,
    HeaderSizes,
    Headers,
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Routine::Discover => write!(f, "read_data (header only)"),
            Routine::Fill => write!(f, "read_data"),
            Routine::Labels => write!(f, "get_labels"),
            Routine::HeaderSizes => write!(f, "get_header_vals_size"),
            Routine::Headers => write!(f, "get_headers"),
        }
    }
}

// ---------------------------------------------------------------------------
// Load request
// ---------------------------------------------------------------------------

/// Arguments of one `read_data` call besides the buffer and the counts.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub path: PathBuf,
    pub format: String,
    /// Only populate `npart` / `ncol`; the buffer may be empty.
    pub header_only: bool,
    pub verbose: bool,
}

// ---------------------------------------------------------------------------
// Engine trait
// ---------------------------------------------------------------------------

/// The native call contract.
///
/// Counts are in/out parameters exactly like the native routines: the
/// caller passes what it allocated, the engine writes what it found.
pub trait Engine {
    /// Load `request.path`. With `header_only` set only `npart` and `ncol`
    /// are written; otherwise `buffer` (column-major, `ncol` runs of
    /// `npart` values) is filled in place.
    fn read_data(
        &mut self,
        request: &ReadRequest,
        buffer: &mut [f64],
        npart: &mut usize,
        ncol: &mut usize,
    ) -> EngineStatus;

    /// Fill `block` with `ncol` labels of the last load, each padded to
    /// [`crate::read::codec::LABEL_WIDTH`] bytes.
    fn labels(&mut self, block: &mut [u8], ncol: usize) -> EngineStatus;

    /// Element counts of the header tag and value arrays of the last load.
    fn header_sizes(&mut self, ntags: &mut usize, nvals: &mut usize) -> EngineStatus;

    /// Fill `tags` (each [`crate::read::codec::TAG_WIDTH`] bytes) and
    /// `values`, sized from [`Engine::header_sizes`].
    fn headers(&mut self, tags: &mut [u8], values: &mut [f64]) -> EngineStatus;

    /// Silence (or restore) the engine's diagnostic output. Returns the
    /// previous setting so a scope can put it back.
    fn set_quiet(&mut self, quiet: bool) -> bool;

    /// Whether the engine knows the format tag at all.
    fn supports_format(&self, _format: &str) -> bool {
        true
    }

    /// Known format tags, for error messages. Empty when unknown.
    fn formats(&self) -> &[&'static str] {
        &[]
    }
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn read_data(
        &mut self,
        request: &ReadRequest,
        buffer: &mut [f64],
        npart: &mut usize,
        ncol: &mut usize,
    ) -> EngineStatus {
        (**self).read_data(request, buffer, npart, ncol)
    }

    fn labels(&mut self, block: &mut [u8], ncol: usize) -> EngineStatus {
        (**self).labels(block, ncol)
    }

    fn header_sizes(&mut self, ntags: &mut usize, nvals: &mut usize) -> EngineStatus {
        (**self).header_sizes(ntags, nvals)
    }

    fn headers(&mut self, tags: &mut [u8], values: &mut [f64]) -> EngineStatus {
        (**self).headers(tags, values)
    }

    fn set_quiet(&mut self, quiet: bool) -> bool {
        (**self).set_quiet(quiet)
    }

    fn supports_format(&self, format: &str) -> bool {
        (**self).supports_format(format)
    }

    fn formats(&self) -> &[&'static str] {
        (**self).formats()
    }
}
