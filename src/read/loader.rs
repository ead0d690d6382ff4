use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::{Engine, QuietScope, ReadRequest, Routine};
use crate::error::{Result, SnapshotError};

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// Particle and column counts of a snapshot. `ncol` includes the trailing
/// particle-type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub npart: usize,
    pub ncol: usize,
}

impl Shape {
    pub fn new(npart: usize, ncol: usize) -> Self {
        Self { npart, ncol }
    }

    /// Number of values a buffer of this shape holds.
    pub fn len(&self) -> Result<usize> {
        self.npart.checked_mul(self.ncol).ok_or_else(|| {
            SnapshotError::ShapeMismatch(format!(
                "{} particles × {} columns overflows",
                self.npart, self.ncol
            ))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.npart == 0 || self.ncol == 0
    }
}

/// A fully populated column-major buffer and its real dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBuffer {
    pub data: Vec<f64>,
    pub shape: Shape,
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Size-discovery-then-fill protocol. `Sizing` is skipped when the caller
/// already knows the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Negotiation {
    Sizing,
    Filling(Shape),
}

/// Load `path` through `engine`, discovering the shape first unless
/// `known` is given.
///
/// Never hands back a partially filled buffer: an engine failure in either
/// phase, or a fill that reports a different shape than was allocated,
/// aborts the load.
pub fn load<E: Engine + ?Sized>(
    engine: &mut E,
    path: &Path,
    format: &str,
    known: Option<Shape>,
    verbose: bool,
) -> Result<LoadedBuffer> {
    if !path.exists() {
        return Err(SnapshotError::NotFound(path.to_path_buf()));
    }

    let mut request = ReadRequest {
        path: path.to_path_buf(),
        format: format.to_string(),
        header_only: true,
        verbose,
    };
    let mut state = match known {
        Some(shape) => Negotiation::Filling(shape),
        None => Negotiation::Sizing,
    };

    loop {
        match state {
            Negotiation::Sizing => {
                let shape = discover(engine, &request)?;
                log::debug!(
                    "{}: discovered npart={}, ncol={}",
                    path.display(),
                    shape.npart,
                    shape.ncol
                );
                state = Negotiation::Filling(shape);
            }
            Negotiation::Filling(shape) => {
                request.header_only = false;
                let data = fill(engine, &request, shape)?;
                log::debug!("{}: filled {} values", path.display(), data.len());
                return Ok(LoadedBuffer { data, shape });
            }
        }
    }
}

fn discover<E: Engine + ?Sized>(engine: &mut E, request: &ReadRequest) -> Result<Shape> {
    let (mut npart, mut ncol) = (0usize, 0usize);
    let status = {
        let mut engine = QuietScope::engage(engine, request.verbose);
        engine.read_data(request, &mut [], &mut npart, &mut ncol)
    };
    status.check(Routine::Discover, &request.path)?;

    let shape = Shape::new(npart, ncol);
    shape.len()?;
    Ok(shape)
}

fn fill<E: Engine + ?Sized>(engine: &mut E, request: &ReadRequest, shape: Shape) -> Result<Vec<f64>> {
    if shape.ncol == 0 {
        return Err(SnapshotError::ShapeMismatch(
            "a snapshot has at least the particle-type column".into(),
        ));
    }
    let mut buffer = vec![0.0; shape.len()?];
    let (mut npart, mut ncol) = (shape.npart, shape.ncol);
    let status = {
        let mut engine = QuietScope::engage(engine, request.verbose);
        engine.read_data(request, &mut buffer, &mut npart, &mut ncol)
    };
    status.check(Routine::Fill, &request.path)?;

    if (npart, ncol) != (shape.npart, shape.ncol) {
        return Err(SnapshotError::ShapeMismatch(format!(
            "allocated {} × {} but the engine filled {npart} × {ncol}",
            shape.npart, shape.ncol
        )));
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryEngine, MemorySnapshot};

    fn snapshot(npart: usize, nphys: usize) -> MemorySnapshot {
        let labels: Vec<String> = (0..nphys).map(|i| format!("c{i}")).collect();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let physical = (0..nphys)
            .map(|c| (0..npart).map(|r| (c * 1000 + r) as f64).collect())
            .collect();
        MemorySnapshot::new(&refs, physical, vec![1.0; npart])
    }

    #[test]
    fn discovery_then_fill_gives_exact_shape() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = MemoryEngine::new().with_snapshot(file.path(), snapshot(100, 4));

        let loaded = load(&mut engine, file.path(), "phantom", None, false).unwrap();
        assert_eq!(loaded.shape, Shape::new(100, 5));
        assert_eq!(loaded.data.len(), 500);
        // column c1, row 7
        assert_eq!(loaded.data[100 + 7], 1007.0);
        assert_eq!(engine.calls(), &[Routine::Discover, Routine::Fill]);
    }

    #[test]
    fn known_shape_skips_discovery() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = MemoryEngine::new().with_snapshot(file.path(), snapshot(3, 1));

        let loaded = load(&mut engine, file.path(), "phantom", Some(Shape::new(3, 2)), false).unwrap();
        assert_eq!(loaded.shape, Shape::new(3, 2));
        assert_eq!(engine.calls(), &[Routine::Fill]);
    }

    #[test]
    fn wrong_known_shape_is_an_engine_failure() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = MemoryEngine::new().with_snapshot(file.path(), snapshot(3, 1));

        let err = load(&mut engine, file.path(), "phantom", Some(Shape::new(4, 2)), false).unwrap_err();
        assert!(matches!(err, SnapshotError::Engine { routine: Routine::Fill, .. }));
    }

    #[test]
    fn fill_failure_propagates() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = MemoryEngine::new()
            .with_snapshot(file.path(), snapshot(10, 2))
            .fail_on(Routine::Fill);

        let err = load(&mut engine, file.path(), "phantom", None, false).unwrap_err();
        assert!(matches!(err, SnapshotError::Engine { routine: Routine::Fill, .. }));
    }

    #[test]
    fn discovery_failure_stops_before_fill() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = MemoryEngine::new()
            .with_snapshot(file.path(), snapshot(10, 2))
            .fail_on(Routine::Discover);

        let err = load(&mut engine, file.path(), "phantom", None, false).unwrap_err();
        assert!(matches!(err, SnapshotError::Engine { routine: Routine::Discover, .. }));
        assert_eq!(engine.calls(), &[Routine::Discover]);
    }

    #[test]
    fn missing_file_fails_before_engine() {
        let mut engine = MemoryEngine::new();
        let err = load(&mut engine, Path::new("/no/such/dump_00000"), "phantom", None, false).unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound(_)));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn zero_columns_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = MemoryEngine::new().with_snapshot(file.path(), MemorySnapshot::default());

        let err = load(&mut engine, file.path(), "phantom", None, false).unwrap_err();
        assert!(matches!(err, SnapshotError::ShapeMismatch(_)));
    }

    #[test]
    fn quiet_mode_is_restored_after_failure() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = MemoryEngine::new()
            .with_snapshot(file.path(), snapshot(1, 1))
            .fail_on(Routine::Fill);

        assert!(load(&mut engine, file.path(), "phantom", None, false).is_err());
        assert!(!engine.is_quiet());
    }

    #[test]
    fn known_shape_without_columns_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut engine = MemoryEngine::new().with_snapshot(file.path(), snapshot(0, 0));

        let err = load(&mut engine, file.path(), "phantom", Some(Shape::new(0, 0)), false).unwrap_err();
        assert!(matches!(err, SnapshotError::ShapeMismatch(_)));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        assert!(Shape::new(usize::MAX, 2).len().is_err());
        assert_eq!(Shape::new(100, 5).len().unwrap(), 500);
    }
}
