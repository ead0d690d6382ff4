use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use super::loader::{load, Shape};
use super::metadata::{resolve_headers, resolve_labels};
use super::CATEGORY_LABEL;
use crate::data::model::Dataset;
use crate::engine::Engine;
use crate::error::{Result, SnapshotError};

// ---------------------------------------------------------------------------
// Read options
// ---------------------------------------------------------------------------

/// How to read one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Format tag handed to the engine (`phantom`, `gadget`, `ascii`, …).
    pub format: String,
    /// Skip size discovery when the shape is already known. A wrong shape
    /// makes the engine fail the fill.
    pub shape: Option<Shape>,
    /// Let the engine's own diagnostics through.
    pub verbose: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            format: "phantom".to_string(),
            shape: None,
            verbose: false,
        }
    }
}

impl ReadOptions {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            ..Self::default()
        }
    }

    pub fn with_shape(mut self, npart: usize, ncol: usize) -> Self {
        self.shape = Some(Shape::new(npart, ncol));
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

// ---------------------------------------------------------------------------
// SnapshotReader
// ---------------------------------------------------------------------------

/// Owns an engine and serialises every load through it.
///
/// The engine keeps the last file's labels and header as hidden state, so
/// the discovery, fill, label and header calls of one read all run under a
/// single lock with nothing interleaved.
pub struct SnapshotReader<E> {
    engine: Mutex<E>,
}

impl<E: Engine> SnapshotReader<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    /// Read `path` into a [`Dataset`]. Blocks for the whole file read.
    pub fn read(&self, path: impl AsRef<Path>, options: &ReadOptions) -> Result<Dataset> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SnapshotError::NotFound(path.to_path_buf()));
        }

        // A poisoned lock only means an earlier read panicked; the next
        // load replaces whatever state it left.
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        if !engine.supports_format(&options.format) {
            return Err(SnapshotError::unrecognized(
                "format",
                &options.format,
                engine.formats(),
            ));
        }

        let loaded = load(&mut *engine, path, &options.format, options.shape, options.verbose)?;
        let physical = resolve_labels(&mut *engine, loaded.shape.ncol - 1, path, options.verbose)?;
        let headers = resolve_headers(&mut *engine, path, options.verbose)?;
        drop(engine);

        let labels = normalise_labels(physical);
        let dataset = Dataset::new(loaded.data, loaded.shape.npart, labels, headers)?
            .with_source(path, &options.format);
        log::info!(
            "read {} ({} headers)",
            dataset,
            dataset.headers().len()
        );
        Ok(dataset)
    }

    pub fn into_inner(self) -> E {
        self.engine
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Make engine labels usable as unique column names and append the
/// particle-type label.
///
/// Blank labels become `column N`; repeats (including a physical column
/// that claims the reserved type label) get `_2`, `_3`, … suffixes.
pub(crate) fn normalise_labels(physical: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    taken.insert(CATEGORY_LABEL.to_string());

    let mut labels = Vec::with_capacity(physical.len() + 1);
    for (i, raw) in physical.into_iter().enumerate() {
        let base = if raw.is_empty() {
            log::warn!("column {} has no label", i + 1);
            format!("column {}", i + 1)
        } else {
            raw
        };
        let mut label = base.clone();
        let mut n = 2;
        while taken.contains(&label) {
            label = format!("{base}_{n}");
            n += 1;
        }
        if label != base {
            log::warn!("duplicate column label `{base}` renamed to `{label}`");
        }
        taken.insert(label.clone());
        labels.push(label);
    }
    labels.push(CATEGORY_LABEL.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::engine::{EngineStatus, MemoryEngine, MemorySnapshot, ReadRequest, Routine};

    fn snapshot() -> MemorySnapshot {
        MemorySnapshot::new(
            &["x", "y", "z", "h"],
            vec![
                vec![0.0, 1.0, 2.0],
                vec![0.0, 0.5, 1.0],
                vec![0.0, 0.0, 0.0],
                vec![0.1, 0.1, 0.2],
            ],
            vec![1.0, 1.0, 3.0],
        )
        .with_header("time", 12.5)
        .with_header("", 0.0)
        .with_header("massoftype(1)", 1e-4)
    }

    #[test]
    fn read_builds_labelled_dataset() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let reader = SnapshotReader::new(MemoryEngine::new().with_snapshot(file.path(), snapshot()));

        let ds = reader.read(file.path(), &ReadOptions::default()).unwrap();
        assert_eq!(ds.npart(), 3);
        assert_eq!(ds.ncol(), 5);
        assert_eq!(ds.labels(), &["x", "y", "z", "h", "itype"]);
        assert_eq!(ds.category_column(), &[1.0, 1.0, 3.0]);
        assert_eq!(ds.headers().len(), 2);
        assert_eq!(ds.headers().get("time"), Some(12.5));
        assert_eq!(ds.format(), Some("phantom"));

        let engine = reader.into_inner();
        assert_eq!(
            engine.calls(),
            &[
                Routine::Discover,
                Routine::Fill,
                Routine::Labels,
                Routine::HeaderSizes,
                Routine::Headers
            ]
        );
    }

    #[test]
    fn label_count_is_one_more_than_physical_labels() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let reader = SnapshotReader::new(MemoryEngine::new().with_snapshot(file.path(), snapshot()));
        let ds = reader.read(file.path(), &ReadOptions::default()).unwrap();
        assert_eq!(ds.labels().len(), ds.ncol());
        assert_eq!(ds.labels().last().map(String::as_str), Some(CATEGORY_LABEL));
    }

    #[test]
    fn fill_failure_yields_no_dataset() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let engine = MemoryEngine::new()
            .with_snapshot(file.path(), snapshot())
            .fail_on(Routine::Fill);
        let reader = SnapshotReader::new(engine);

        let err = reader.read(file.path(), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, SnapshotError::Engine { routine: Routine::Fill, .. }));
        let engine = reader.into_inner();
        assert!(!engine.calls().contains(&Routine::Labels));
    }

    #[test]
    fn label_failure_aborts_read() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let engine = MemoryEngine::new()
            .with_snapshot(file.path(), snapshot())
            .fail_on(Routine::Labels);
        let reader = SnapshotReader::new(engine);

        let err = reader.read(file.path(), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, SnapshotError::Engine { routine: Routine::Labels, .. }));
    }

    #[test]
    fn missing_path_is_not_found() {
        let reader = SnapshotReader::new(MemoryEngine::new());
        let err = reader
            .read("/definitely/not/here/dump_00042", &ReadOptions::default())
            .unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound(_)));
    }

    #[test]
    fn unsupported_format_fails_before_engine_call() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let reader = SnapshotReader::new(crate::engine::TextEngine::new());
        let err = reader.read(file.path(), &ReadOptions::new("phantom")).unwrap_err();
        assert!(matches!(err, SnapshotError::UnrecognizedOption { kind: "format", .. }));
        assert!(err.to_string().contains("ascii || csv"));
    }

    #[test]
    fn known_shape_is_honoured() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let reader = SnapshotReader::new(MemoryEngine::new().with_snapshot(file.path(), snapshot()));
        let ds = reader
            .read(file.path(), &ReadOptions::default().with_shape(3, 5))
            .unwrap();
        assert_eq!(ds.npart(), 3);
        assert_eq!(reader.into_inner().calls()[0], Routine::Fill);
    }

    #[test]
    fn labels_are_made_unique() {
        let labels = normalise_labels(vec![
            "x".into(),
            "".into(),
            "x".into(),
            "itype".into(),
            "x_2".into(),
        ]);
        assert_eq!(
            labels,
            vec!["x", "column 2", "x_2", "itype_2", "x_2_2", "itype"]
        );
    }

    #[test]
    fn ragged_engine_snapshot_is_an_engine_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let ragged = MemorySnapshot::new(&["x"], vec![vec![1.0, 2.0]], vec![1.0]);
        let reader = SnapshotReader::new(MemoryEngine::new().with_snapshot(file.path(), ragged));
        let err = reader.read(file.path(), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, SnapshotError::Engine { routine: Routine::Discover, .. }));
    }

    /// Logs every call with the file the last `read_data` named.
    struct TracingEngine {
        inner: MemoryEngine,
        current: Option<PathBuf>,
        log: Arc<Mutex<Vec<(Routine, PathBuf)>>>,
    }

    impl TracingEngine {
        fn record(&self, routine: Routine) {
            let path = self.current.clone().unwrap_or_default();
            self.log.lock().unwrap().push((routine, path));
            // widen the window for another thread to sneak in
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    impl Engine for TracingEngine {
        fn read_data(
            &mut self,
            request: &ReadRequest,
            buffer: &mut [f64],
            npart: &mut usize,
            ncol: &mut usize,
        ) -> EngineStatus {
            self.current = Some(request.path.clone());
            let routine = if request.header_only { Routine::Discover } else { Routine::Fill };
            self.record(routine);
            self.inner.read_data(request, buffer, npart, ncol)
        }

        fn labels(&mut self, block: &mut [u8], ncol: usize) -> EngineStatus {
            self.record(Routine::Labels);
            self.inner.labels(block, ncol)
        }

        fn header_sizes(&mut self, ntags: &mut usize, nvals: &mut usize) -> EngineStatus {
            self.record(Routine::HeaderSizes);
            self.inner.header_sizes(ntags, nvals)
        }

        fn headers(&mut self, tags: &mut [u8], values: &mut [f64]) -> EngineStatus {
            self.record(Routine::Headers);
            self.inner.headers(tags, values)
        }

        fn set_quiet(&mut self, quiet: bool) -> bool {
            self.inner.set_quiet(quiet)
        }
    }

    #[test]
    fn concurrent_reads_never_interleave() {
        let first = tempfile::NamedTempFile::new().unwrap();
        let second = tempfile::NamedTempFile::new().unwrap();
        let other = MemorySnapshot::new(&["rho"], vec![vec![5.0; 7]], vec![1.0; 7]).with_header("time", 3.0);
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = TracingEngine {
            inner: MemoryEngine::new()
                .with_snapshot(first.path(), snapshot())
                .with_snapshot(second.path(), other),
            current: None,
            log: log.clone(),
        };
        let reader = Arc::new(SnapshotReader::new(engine));

        const READS: usize = 8;
        let handles: Vec<_> = [first.path().to_path_buf(), second.path().to_path_buf()]
            .into_iter()
            .map(|path| {
                let reader = reader.clone();
                std::thread::spawn(move || {
                    for _ in 0..READS {
                        let ds = reader.read(&path, &ReadOptions::default()).unwrap();
                        assert_eq!(ds.source().map(|s| s.path.clone()), Some(path.clone()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let log = log.lock().unwrap();
        let sequence = [
            Routine::Discover,
            Routine::Fill,
            Routine::Labels,
            Routine::HeaderSizes,
            Routine::Headers,
        ];
        assert_eq!(log.len(), 2 * READS * sequence.len());
        for read in log.chunks(sequence.len()) {
            let routines: Vec<Routine> = read.iter().map(|(r, _)| *r).collect();
            assert_eq!(routines, sequence);
            assert!(read.iter().all(|(_, p)| *p == read[0].1));
        }
    }
}
