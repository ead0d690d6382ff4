use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use arrow::record_batch::RecordBatch;

use crate::error::{Result, SnapshotError};
use crate::export::{Export, ExportPolicy};
use crate::read::CATEGORY_LABEL;

// ---------------------------------------------------------------------------
// Headers – scalar run metadata
// ---------------------------------------------------------------------------

/// Ordered tag → value mapping. Tags are non-empty and unique; insertion
/// order is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, f64)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the tag is already present or blank. Returns whether
    /// the entry was added.
    pub fn insert_if_absent(&mut self, tag: &str, value: f64) -> bool {
        if tag.is_empty() || self.contains(tag) {
            return false;
        }
        self.entries.push((tag.to_string(), value));
        true
    }

    pub fn get(&self, tag: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|&(_, v)| v)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.iter().any(|(t, _)| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(t, v)| (t.as_str(), *v))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, f64)> for Headers {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (tag, value) in iter {
            headers.insert_if_absent(tag, value);
        }
        headers
    }
}

// ---------------------------------------------------------------------------
// Source – where a Dataset came from
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub path: PathBuf,
    pub format: String,
}

// ---------------------------------------------------------------------------
// Dataset – one normalised snapshot
// ---------------------------------------------------------------------------

/// A snapshot held as `ncol` columns of `npart` values, the column labels
/// in buffer order (the last is always the particle-type column), and the
/// header.
///
/// Numeric content never changes after construction. The tabular and
/// hierarchical views are built on first use and kept until the Dataset is
/// dropped.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Column-major: column `c` is `data[c * npart..(c + 1) * npart]`.
    data: Vec<f64>,
    npart: usize,
    labels: Vec<String>,
    headers: Headers,
    source: Option<Source>,
    table: OnceLock<RecordBatch>,
    hierarchy: OnceLock<Export>,
}

impl Dataset {
    /// Wrap a column-major buffer. Fails unless the buffer holds exactly
    /// `npart × labels.len()` values and the labels are non-empty and unique.
    pub fn new(data: Vec<f64>, npart: usize, labels: Vec<String>, headers: Headers) -> Result<Self> {
        if labels.is_empty() {
            return Err(SnapshotError::InvalidLayout(
                "a dataset needs at least the particle-type column".into(),
            ));
        }
        let expected = npart.checked_mul(labels.len()).ok_or_else(|| {
            SnapshotError::InvalidLayout(format!(
                "{npart} particles × {} columns overflows",
                labels.len()
            ))
        })?;
        if data.len() != expected {
            return Err(SnapshotError::InvalidLayout(format!(
                "buffer holds {} values, expected {npart} × {} = {expected}",
                data.len(),
                labels.len()
            )));
        }
        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if label.is_empty() {
                return Err(SnapshotError::InvalidLayout("empty column label".into()));
            }
            if !seen.insert(label.as_str()) {
                return Err(SnapshotError::InvalidLayout(format!(
                    "column label `{label}` appears more than once"
                )));
            }
        }

        Ok(Self {
            data,
            npart,
            labels,
            headers,
            source: None,
            table: OnceLock::new(),
            hierarchy: OnceLock::new(),
        })
    }

    /// Build from separate physical columns plus the particle types; the
    /// type column is appended under [`CATEGORY_LABEL`].
    pub fn from_columns(
        labels: &[&str],
        columns: Vec<Vec<f64>>,
        itype: Vec<f64>,
        headers: Headers,
    ) -> Result<Self> {
        if labels.len() != columns.len() {
            return Err(SnapshotError::InvalidLayout(format!(
                "{} labels for {} columns",
                labels.len(),
                columns.len()
            )));
        }
        let npart = itype.len();
        if let Some((label, col)) = labels.iter().zip(&columns).find(|(_, c)| c.len() != npart) {
            return Err(SnapshotError::InvalidLayout(format!(
                "column `{label}` has {} rows, expected {npart}",
                col.len()
            )));
        }

        let mut data = Vec::with_capacity(npart * (columns.len() + 1));
        for col in columns {
            data.extend(col);
        }
        data.extend(itype);

        let mut names: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        names.push(CATEGORY_LABEL.to_string());
        Self::new(data, npart, names, headers)
    }

    pub(crate) fn with_source(mut self, path: &Path, format: &str) -> Self {
        self.source = Some(Source {
            path: path.to_path_buf(),
            format: format.to_string(),
        });
        self
    }

    /// Number of particles (rows).
    pub fn npart(&self) -> usize {
        self.npart
    }

    /// Number of columns, including the particle-type column.
    pub fn ncol(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Format tag of the file this came from, if it came from one.
    pub fn format(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.format.as_str())
    }

    /// The raw column-major buffer.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.position(label).is_some()
    }

    pub fn column(&self, label: &str) -> Option<&[f64]> {
        self.position(label).and_then(|c| self.column_at(c))
    }

    /// Lookup by label; `None` when no column carries it.
    pub fn get(&self, label: &str) -> Option<&[f64]> {
        self.column(label)
    }

    pub fn column_at(&self, index: usize) -> Option<&[f64]> {
        if index >= self.labels.len() {
            return None;
        }
        let start = index * self.npart;
        self.data.get(start..start + self.npart)
    }

    /// Label of the trailing particle-type column.
    pub fn category_label(&self) -> &str {
        // `new` guarantees at least one label
        self.labels.last().map_or(CATEGORY_LABEL, String::as_str)
    }

    pub fn category_column(&self) -> &[f64] {
        self.column_at(self.labels.len() - 1).unwrap_or(&[])
    }

    /// Tabular view, one `Float64` column per label. Built once.
    pub fn table(&self) -> Result<&RecordBatch> {
        if let Some(table) = self.table.get() {
            return Ok(table);
        }
        let batch = super::table::record_batch(self)?;
        Ok(self.table.get_or_init(|| batch))
    }

    /// Hierarchical view under the default policy for this dataset's
    /// format. Built once.
    pub fn hierarchy(&self) -> &Export {
        self.hierarchy.get_or_init(|| {
            let policy = ExportPolicy::for_format(self.format().unwrap_or(""));
            policy.apply(self)
        })
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} particles × {} columns", self.npart, self.ncol())?;
        if let Some(source) = &self.source {
            write!(f, " from {} ({})", source.path.display(), source.format)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_columns(
            &["x", "h"],
            vec![vec![0.0, 1.0, 2.0], vec![0.1, 0.2, 0.3]],
            vec![1.0, 3.0, 1.0],
            [("time", 2.0)].into_iter().collect(),
        )
        .unwrap()
    }

    #[test]
    fn columns_are_addressable_by_label_and_index() {
        let ds = sample();
        assert_eq!(ds.npart(), 3);
        assert_eq!(ds.ncol(), 3);
        assert_eq!(ds.column("h"), Some(&[0.1, 0.2, 0.3][..]));
        assert_eq!(ds.column_at(0), Some(&[0.0, 1.0, 2.0][..]));
        assert_eq!(ds.column_at(3), None);
        assert_eq!(ds.column("rho"), None);
    }

    #[test]
    fn last_label_is_category_column() {
        let ds = sample();
        assert_eq!(ds.category_label(), "itype");
        assert_eq!(ds.category_column(), &[1.0, 3.0, 1.0]);
    }

    #[test]
    fn rejects_wrong_buffer_length() {
        let err = Dataset::new(vec![0.0; 5], 3, vec!["x".into(), "itype".into()], Headers::new());
        assert!(matches!(err, Err(SnapshotError::InvalidLayout(_))));
    }

    #[test]
    fn rejects_duplicate_and_empty_labels() {
        let dup = Dataset::new(vec![0.0; 2], 1, vec!["x".into(), "x".into()], Headers::new());
        assert!(dup.is_err());
        let empty = Dataset::new(vec![0.0; 2], 1, vec!["".into(), "x".into()], Headers::new());
        assert!(empty.is_err());
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let err = Dataset::from_columns(&["x"], vec![vec![1.0]], vec![1.0, 1.0], Headers::new());
        assert!(err.is_err());
    }

    #[test]
    fn empty_snapshot_is_valid() {
        let ds = Dataset::from_columns(&["x"], vec![vec![]], vec![], Headers::new()).unwrap();
        assert_eq!(ds.npart(), 0);
        assert_eq!(ds.column("x"), Some(&[][..]));
    }

    #[test]
    fn headers_keep_insertion_order() {
        let headers: Headers = [("time", 1.0), ("gamma", 1.4), ("time", 9.0)]
            .into_iter()
            .collect();
        assert_eq!(headers.tags().collect::<Vec<_>>(), vec!["time", "gamma"]);
        assert_eq!(headers.get("time"), Some(1.0));
    }

    #[test]
    fn table_view_is_cached() {
        let ds = sample();
        let first = ds.table().unwrap() as *const RecordBatch;
        let second = ds.table().unwrap() as *const RecordBatch;
        assert_eq!(first, second);
    }
}
