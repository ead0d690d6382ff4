use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{Engine, EngineStatus, ReadRequest, Routine};
use crate::read::codec::FixedWidth;

// ---------------------------------------------------------------------------
// In-memory snapshot
// ---------------------------------------------------------------------------

/// A snapshot as the engine would see it after decoding a file.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    /// Physical labels, one per column of `columns` except the last.
    pub labels: Vec<String>,
    /// All columns including the trailing particle-type column.
    pub columns: Vec<Vec<f64>>,
    /// Raw tag/value arrays, blanks included, exactly as handed out.
    pub header_tags: Vec<String>,
    pub header_values: Vec<f64>,
}

impl MemorySnapshot {
    /// Build from physical columns and per-particle types.
    pub fn new(labels: &[&str], physical: Vec<Vec<f64>>, itype: Vec<f64>) -> Self {
        let mut columns = physical;
        columns.push(itype);
        Self {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            columns,
            header_tags: Vec::new(),
            header_values: Vec::new(),
        }
    }

    pub fn with_header(mut self, tag: &str, value: f64) -> Self {
        self.header_tags.push(tag.to_string());
        self.header_values.push(value);
        self
    }

    pub fn npart(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn ncol(&self) -> usize {
        self.columns.len()
    }

    /// Every column holds `npart` values.
    pub fn is_rectangular(&self) -> bool {
        let n = self.npart();
        self.columns.iter().all(|c| c.len() == n)
    }
}

// ---------------------------------------------------------------------------
// MemoryEngine
// ---------------------------------------------------------------------------

/// Engine serving registered in-memory snapshots.
///
/// Behaves like the native library: it keeps the last successful load
/// around for the label and header calls, refuses a fill whose buffer is
/// not exactly `npart * ncol`, and can be told to fail a given routine.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    snapshots: HashMap<PathBuf, MemorySnapshot>,
    last: Option<PathBuf>,
    quiet: bool,
    fail_on: Option<Routine>,
    calls: Vec<Routine>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, snapshot: MemorySnapshot) {
        self.snapshots.insert(path.into(), snapshot);
    }

    pub fn with_snapshot(mut self, path: impl Into<PathBuf>, snapshot: MemorySnapshot) -> Self {
        self.insert(path, snapshot);
        self
    }

    /// Report failure from `routine` on every subsequent call to it.
    pub fn fail_on(mut self, routine: Routine) -> Self {
        self.fail_on = Some(routine);
        self
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Routines invoked so far, in order.
    pub fn calls(&self) -> &[Routine] {
        &self.calls
    }

    fn enter(&mut self, routine: Routine) -> bool {
        self.calls.push(routine);
        self.fail_on == Some(routine)
    }

    fn current(&self) -> Option<&MemorySnapshot> {
        self.last.as_ref().and_then(|p| self.snapshots.get(p))
    }

    fn lookup(&self, path: &Path) -> Option<&MemorySnapshot> {
        self.snapshots.get(path)
    }
}

impl Engine for MemoryEngine {
    fn read_data(
        &mut self,
        request: &ReadRequest,
        buffer: &mut [f64],
        npart: &mut usize,
        ncol: &mut usize,
    ) -> EngineStatus {
        let routine = if request.header_only {
            Routine::Discover
        } else {
            Routine::Fill
        };
        if self.enter(routine) {
            self.last = None;
            return EngineStatus::FAILED;
        }
        // a new load invalidates whatever the previous one left behind
        self.last = None;
        let Some(snapshot) = self.lookup(&request.path) else {
            return EngineStatus::FAILED;
        };
        let (n, m) = (snapshot.npart(), snapshot.ncol());
        if !snapshot.is_rectangular() {
            log::debug!("memory engine: ragged snapshot at {}", request.path.display());
            return EngineStatus::FAILED;
        }

        if !request.header_only {
            if *npart != n || *ncol != m || buffer.len() != n * m {
                return EngineStatus::FAILED;
            }
            for (dst, src) in buffer.chunks_exact_mut(n.max(1)).zip(&snapshot.columns) {
                dst.copy_from_slice(src);
            }
        }

        *npart = n;
        *ncol = m;
        self.last = Some(request.path.clone());
        EngineStatus::OK
    }

    fn labels(&mut self, block: &mut [u8], ncol: usize) -> EngineStatus {
        if self.enter(Routine::Labels) {
            return EngineStatus::FAILED;
        }
        let Some(snapshot) = self.current() else {
            return EngineStatus::FAILED;
        };
        if ncol > snapshot.labels.len() {
            return EngineStatus::FAILED;
        }
        match FixedWidth::LABELS.encode_into(&snapshot.labels[..ncol], block) {
            Ok(()) => EngineStatus::OK,
            Err(_) => EngineStatus::FAILED,
        }
    }

    fn header_sizes(&mut self, ntags: &mut usize, nvals: &mut usize) -> EngineStatus {
        if self.enter(Routine::HeaderSizes) {
            return EngineStatus::FAILED;
        }
        let Some(snapshot) = self.current() else {
            return EngineStatus::FAILED;
        };
        *ntags = snapshot.header_tags.len();
        *nvals = snapshot.header_values.len();
        EngineStatus::OK
    }

    fn headers(&mut self, tags: &mut [u8], values: &mut [f64]) -> EngineStatus {
        if self.enter(Routine::Headers) {
            return EngineStatus::FAILED;
        }
        let Some(snapshot) = self.current() else {
            return EngineStatus::FAILED;
        };
        if values.len() != snapshot.header_values.len() {
            return EngineStatus::FAILED;
        }
        if FixedWidth::TAGS.encode_into(&snapshot.header_tags, tags).is_err() {
            return EngineStatus::FAILED;
        }
        values.copy_from_slice(&snapshot.header_values);
        EngineStatus::OK
    }

    fn set_quiet(&mut self, quiet: bool) -> bool {
        std::mem::replace(&mut self.quiet, quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, header_only: bool) -> ReadRequest {
        ReadRequest {
            path: PathBuf::from(path),
            format: "phantom".into(),
            header_only,
            verbose: false,
        }
    }

    fn engine() -> MemoryEngine {
        MemoryEngine::new().with_snapshot(
            "a",
            MemorySnapshot::new(&["x"], vec![vec![1.0, 2.0]], vec![1.0, 3.0]),
        )
    }

    #[test]
    fn discovery_needs_no_buffer() {
        let mut engine = engine();
        let (mut n, mut m) = (0, 0);
        let status = engine.read_data(&request("a", true), &mut [], &mut n, &mut m);
        assert_eq!(status, EngineStatus::OK);
        assert_eq!((n, m), (2, 2));
    }

    #[test]
    fn fill_rejects_wrong_sized_buffer() {
        let mut engine = engine();
        let mut buffer = vec![0.0; 3];
        let (mut n, mut m) = (2, 2);
        let status = engine.read_data(&request("a", false), &mut buffer, &mut n, &mut m);
        assert!(status.is_failure());
    }

    #[test]
    fn labels_need_a_prior_load() {
        let mut engine = engine();
        let mut block = FixedWidth::LABELS.blank(1);
        assert!(engine.labels(&mut block, 1).is_failure());
    }

    #[test]
    fn unknown_path_fails() {
        let mut engine = engine();
        let (mut n, mut m) = (0, 0);
        let status = engine.read_data(&request("missing", true), &mut [], &mut n, &mut m);
        assert!(status.is_failure());
    }

    #[test]
    fn ragged_snapshot_fails_instead_of_panicking() {
        let mut engine = MemoryEngine::new().with_snapshot(
            "ragged",
            MemorySnapshot::new(&["x"], vec![vec![1.0, 2.0]], vec![1.0]),
        );
        let (mut n, mut m) = (0, 0);
        let status = engine.read_data(&request("ragged", true), &mut [], &mut n, &mut m);
        assert!(status.is_failure());

        let mut buffer = vec![0.0; 4];
        let (mut n, mut m) = (2, 2);
        let status = engine.read_data(&request("ragged", false), &mut buffer, &mut n, &mut m);
        assert!(status.is_failure());
    }
}
