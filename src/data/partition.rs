use serde::{Deserialize, Serialize};

use super::model::Dataset;
use crate::error::{Result, SnapshotError};

// ---------------------------------------------------------------------------
// Category predicate
// ---------------------------------------------------------------------------

/// Which values of the category column select the distinguished set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryPredicate {
    Equals(f64),
    OneOf(Vec<f64>),
    /// Inclusive on both ends.
    Between { min: f64, max: f64 },
}

impl CategoryPredicate {
    pub fn matches(&self, value: f64) -> bool {
        match self {
            CategoryPredicate::Equals(v) => value == *v,
            CategoryPredicate::OneOf(vs) => vs.contains(&value),
            CategoryPredicate::Between { min, max } => (*min..=*max).contains(&value),
        }
    }
}

// ---------------------------------------------------------------------------
// Partition – two disjoint row index sets
// ---------------------------------------------------------------------------

/// Row indices split by a predicate. Both sides are ascending, disjoint,
/// and together cover `0..npart` exactly. Indices borrow nothing; the
/// dataset's buffer is never copied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub matching: Vec<usize>,
    pub rest: Vec<usize>,
}

impl Partition {
    /// Total number of rows covered.
    pub fn len(&self) -> usize {
        self.matching.len() + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split the rows of `dataset` on `predicate` applied to column `label`.
pub fn partition<F>(dataset: &Dataset, label: &str, predicate: F) -> Result<Partition>
where
    F: Fn(f64) -> bool,
{
    let column = dataset
        .column(label)
        .ok_or_else(|| SnapshotError::MissingColumn(label.to_string()))?;

    let (matching, rest): (Vec<usize>, Vec<usize>) =
        (0..column.len()).partition(|&row| predicate(column[row]));
    Ok(Partition { matching, rest })
}

pub fn partition_by(
    dataset: &Dataset,
    label: &str,
    predicate: &CategoryPredicate,
) -> Result<Partition> {
    partition(dataset, label, |v| predicate.matches(v))
}
