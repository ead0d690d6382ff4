use std::path::Path;

use serde::{Deserialize, Serialize};

use super::tree::{export, CategoryRows, Export, ExportWarning, Field, HEADER_GROUP};
use crate::data::model::Dataset;
use crate::data::partition::{partition_by, CategoryPredicate};
use crate::error::{Result, SnapshotError};
use crate::read::CATEGORY_LABEL;

/// Particle type Phantom uses for sink particles.
pub const SINK_TYPE: f64 = 3.0;

/// Equation-of-state index written when the header does not carry one.
pub const DEFAULT_IEOS: f64 = 3.0;

/// Names accepted by [`ExportPolicy::named`].
pub const POLICY_NAMES: &[&str] = &["phantom", "flat"];

// ---------------------------------------------------------------------------
// Bundling rules
// ---------------------------------------------------------------------------

/// Scalar columns merged into one `N × k` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub name: String,
    pub sources: Vec<String>,
    /// Columns written next to the block and left out of pass-through.
    #[serde(default)]
    pub companions: Vec<String>,
}

impl Bundle {
    pub fn new(name: &str, sources: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            companions: Vec::new(),
        }
    }

    pub fn with_companions(mut self, companions: &[&str]) -> Self {
        self.companions = companions.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// A named group selected by a predicate on the category column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub name: String,
    pub predicate: CategoryPredicate,
}

// ---------------------------------------------------------------------------
// ExportPolicy
// ---------------------------------------------------------------------------

/// How a dataset is split into groups and which columns are bundled.
///
/// ```json
/// {
///   "category_column": "itype",
///   "distinguished": { "name": "sinks", "predicate": { "equals": 3.0 } },
///   "remainder_group": "particles",
///   "bundles": [{ "name": "xyz", "sources": ["x", "y", "z"] }],
///   "extra_header_quantities": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPolicy {
    #[serde(default = "default_category_column")]
    pub category_column: String,
    #[serde(default)]
    pub distinguished: Option<CategoryGroup>,
    #[serde(default = "default_remainder_group")]
    pub remainder_group: String,
    #[serde(default)]
    pub bundles: Vec<Bundle>,
    #[serde(default)]
    pub extra_header_quantities: bool,
}

fn default_category_column() -> String {
    CATEGORY_LABEL.to_string()
}

fn default_remainder_group() -> String {
    "particles".to_string()
}

impl Default for ExportPolicy {
    fn default() -> Self {
        Self::flat()
    }
}

impl ExportPolicy {
    /// Everything in one `particles` group, no bundles.
    pub fn flat() -> Self {
        Self {
            category_column: default_category_column(),
            distinguished: None,
            remainder_group: default_remainder_group(),
            bundles: Vec::new(),
            extra_header_quantities: false,
        }
    }

    /// Layout expected by Phantom's own tooling: sinks split from the gas,
    /// position and velocity bundles, `ieos` and `massoftype` in the header.
    pub fn phantom() -> Self {
        Self {
            category_column: default_category_column(),
            distinguished: Some(CategoryGroup {
                name: "sinks".to_string(),
                predicate: CategoryPredicate::Equals(SINK_TYPE),
            }),
            remainder_group: default_remainder_group(),
            bundles: vec![
                Bundle::new("xyz", &["x", "y", "z"]),
                Bundle::new("vxyz", &["vx", "vy", "vz"]).with_companions(&["divv"]),
            ],
            extra_header_quantities: true,
        }
    }

    /// Default policy for a reader format tag.
    pub fn for_format(format: &str) -> Self {
        if format.eq_ignore_ascii_case("phantom") {
            Self::phantom()
        } else {
            Self::flat()
        }
    }

    /// Built-in policy by name.
    pub fn named(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "phantom" => Ok(Self::phantom()),
            "flat" => Ok(Self::flat()),
            _ => Err(SnapshotError::unrecognized("export policy", name, POLICY_NAMES)),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SnapshotError::NotFound(path.to_path_buf()));
        }
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        let policy: Self = serde_json::from_reader(file)?;
        log::debug!("export policy loaded from {}", path.display());
        Ok(policy)
    }

    /// Partition `dataset` and lay it out as a group tree.
    ///
    /// Without the category column every row lands in the remainder group.
    pub fn apply(&self, dataset: &Dataset) -> Export {
        let all_rows: Vec<usize>;
        let split;
        let mut warnings = Vec::new();

        let categories: Vec<CategoryRows<'_>> = match &self.distinguished {
            Some(group) => match partition_by(dataset, &self.category_column, &group.predicate) {
                Ok(partition) => {
                    split = partition;
                    vec![
                        CategoryRows {
                            name: &group.name,
                            rows: &split.matching,
                        },
                        CategoryRows {
                            name: &self.remainder_group,
                            rows: &split.rest,
                        },
                    ]
                }
                Err(_) => {
                    warnings.push(ExportWarning::MissingField {
                        group: group.name.clone(),
                        field: group.name.clone(),
                        column: self.category_column.clone(),
                    });
                    all_rows = (0..dataset.npart()).collect();
                    vec![CategoryRows {
                        name: &self.remainder_group,
                        rows: &all_rows,
                    }]
                }
            },
            None => {
                all_rows = (0..dataset.npart()).collect();
                vec![CategoryRows {
                    name: &self.remainder_group,
                    rows: &all_rows,
                }]
            }
        };

        for warning in &warnings {
            log::warn!("{warning}");
        }
        let mut out = export(dataset, &categories, &self.bundles);
        warnings.append(&mut out.warnings);
        out.warnings = warnings;

        if self.extra_header_quantities {
            add_header_quantities(dataset, &mut out);
        }
        out
    }
}

/// `ieos` and the per-type mass vector, unless the header already has them.
fn add_header_quantities(dataset: &Dataset, out: &mut Export) {
    if out.tree.insert(HEADER_GROUP, "ieos", Field::Scalar(DEFAULT_IEOS)) {
        log::debug!("header has no ieos; assuming {DEFAULT_IEOS}");
    }
    let masses: Vec<f64> = dataset
        .headers()
        .iter()
        .filter(|(tag, _)| tag.contains("massoftype"))
        .map(|(_, value)| value)
        .collect();
    out.tree.insert(HEADER_GROUP, "massoftype", Field::Vector(masses));
}
