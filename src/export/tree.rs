use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::policy::Bundle;
use crate::data::model::Dataset;
use crate::error::{Result, SnapshotError};

/// Group holding the header entries, one scalar per tag.
pub const HEADER_GROUP: &str = "header";

// ---------------------------------------------------------------------------
// Field – one exported array
// ---------------------------------------------------------------------------

/// Serialised untagged. Non-finite values are written as the strings
/// `"NaN"`, `"Infinity"` and `"-Infinity"` so JSON keeps them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Scalar(#[serde(with = "json_float")] f64),
    Vector(#[serde(with = "json_float::seq")] Vec<f64>),
    /// Row-major `rows × cols` block, one row per particle.
    Block {
        rows: usize,
        cols: usize,
        #[serde(with = "json_float::seq")]
        data: Vec<f64>,
    },
}

impl Field {
    /// Number of values stored.
    pub fn len(&self) -> usize {
        match self {
            Field::Scalar(_) => 1,
            Field::Vector(v) => v.len(),
            Field::Block { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Field::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Field::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Row `i` of a block.
    pub fn block_row(&self, i: usize) -> Option<&[f64]> {
        match self {
            Field::Block { rows, cols, data } if i < *rows => data.get(i * cols..(i + 1) * cols),
            _ => None,
        }
    }
}

mod json_float {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const NAN: &str = "NaN";
    const INFINITY: &str = "Infinity";
    const NEG_INFINITY: &str = "-Infinity";

    struct Value(f64);

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self.0 {
                v if v.is_finite() => serializer.serialize_f64(v),
                v if v.is_nan() => serializer.serialize_str(NAN),
                v if v > 0.0 => serializer.serialize_str(INFINITY),
                _ => serializer.serialize_str(NEG_INFINITY),
            }
        }
    }

    impl<'de> Deserialize<'de> for Value {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(ValueVisitor)
        }
    }

    struct ValueVisitor;

    impl Visitor<'_> for ValueVisitor {
        type Value = Value;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a number, \"{NAN}\", \"{INFINITY}\" or \"{NEG_INFINITY}\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
            Ok(Value(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
            Ok(Value(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
            Ok(Value(v as f64))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
            match v {
                NAN => Ok(Value(f64::NAN)),
                INFINITY => Ok(Value(f64::INFINITY)),
                NEG_INFINITY => Ok(Value(f64::NEG_INFINITY)),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Value(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Value::deserialize(deserializer).map(|v| v.0)
    }

    pub mod seq {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::Value;

        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(values.iter().map(|v| Value(*v)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
            let values = Vec::<Value>::deserialize(deserializer)?;
            Ok(values.into_iter().map(|v| v.0).collect())
        }
    }
}

// ---------------------------------------------------------------------------
// ExportTree – group → field → array
// ---------------------------------------------------------------------------

pub type Group = BTreeMap<String, Field>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportTree {
    groups: BTreeMap<String, Group>,
}

impl ExportTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn field(&self, group: &str, name: &str) -> Option<&Field> {
        self.groups.get(group).and_then(|g| g.get(name))
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &Group)> + '_ {
        self.groups.iter().map(|(name, g)| (name.as_str(), g))
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    /// Create `name` if absent, even with no fields.
    pub fn ensure_group(&mut self, name: &str) -> &mut Group {
        self.groups.entry(name.to_string()).or_default()
    }

    /// Add a field. An existing field of that name is left untouched and
    /// `false` is returned.
    pub fn insert(&mut self, group: &str, name: &str, field: Field) -> bool {
        let group = self.ensure_group(group);
        if group.contains_key(name) {
            return false;
        }
        group.insert(name.to_string(), field);
        true
    }

    /// Write the tree as nested JSON objects, replacing `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        log::info!("wrote {} groups to {}", self.groups.len(), path.display());
        Ok(())
    }

    /// Load a tree written by [`ExportTree::write_json`].
    pub fn read_json(path: &Path) -> Result<ExportTree> {
        if !path.exists() {
            return Err(SnapshotError::NotFound(path.to_path_buf()));
        }
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }
}

// ---------------------------------------------------------------------------
// Export result
// ---------------------------------------------------------------------------

/// Non-fatal conditions met while exporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportWarning {
    /// A bundle (or bundle companion) names a column the dataset lacks.
    MissingField {
        group: String,
        field: String,
        column: String,
    },
}

impl fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportWarning::MissingField {
                group,
                field,
                column,
            } => write!(
                f,
                "group `{group}`: `{field}` skipped, column `{column}` not in dataset"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Export {
    pub tree: ExportTree,
    pub warnings: Vec<ExportWarning>,
}

/// One named category and the dataset rows that belong to it.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRows<'a> {
    pub name: &'a str,
    pub rows: &'a [usize],
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

/// Lay `dataset` out as a group tree.
///
/// * `header` holds every header entry as a scalar.
/// * Each category with at least one row gets a group: bundles first, then
///   every remaining column restricted to that category's rows.
///
/// A bundle whose source column is missing is skipped with a warning; the
/// rest of the export goes ahead.
pub fn export(dataset: &Dataset, categories: &[CategoryRows<'_>], bundles: &[Bundle]) -> Export {
    let mut out = Export::default();

    out.tree.ensure_group(HEADER_GROUP);
    for (tag, value) in dataset.headers().iter() {
        out.tree.insert(HEADER_GROUP, tag, Field::Scalar(value));
    }

    for category in categories {
        if category.rows.is_empty() {
            log::debug!("category `{}` is empty; no group written", category.name);
            continue;
        }
        export_category(dataset, category, bundles, &mut out);
    }

    for warning in &out.warnings {
        log::warn!("{warning}");
    }
    out
}

fn export_category(dataset: &Dataset, category: &CategoryRows<'_>, bundles: &[Bundle], out: &mut Export) {
    let group = category.name;
    let rows = category.rows;
    let mut excluded: HashSet<&str> = HashSet::new();

    for bundle in bundles {
        let missing = bundle.sources.iter().find(|s| !dataset.contains(s));
        if let Some(column) = missing {
            out.warnings.push(ExportWarning::MissingField {
                group: group.to_string(),
                field: bundle.name.clone(),
                column: column.clone(),
            });
            continue;
        }

        let sources: Vec<&[f64]> = bundle
            .sources
            .iter()
            .filter_map(|s| dataset.column(s))
            .collect();
        let mut data = Vec::with_capacity(rows.len() * sources.len());
        for &row in rows {
            data.extend(sources.iter().map(|col| col[row]));
        }
        out.tree.insert(
            group,
            &bundle.name,
            Field::Block {
                rows: rows.len(),
                cols: sources.len(),
                data,
            },
        );
        excluded.extend(bundle.sources.iter().map(String::as_str));

        for companion in &bundle.companions {
            match dataset.column(companion) {
                Some(col) => {
                    out.tree.insert(group, companion, Field::Vector(gather(col, rows)));
                    excluded.insert(companion);
                }
                None => out.warnings.push(ExportWarning::MissingField {
                    group: group.to_string(),
                    field: companion.clone(),
                    column: companion.clone(),
                }),
            }
        }
    }

    for (index, label) in dataset.labels().iter().enumerate() {
        if excluded.contains(label.as_str()) {
            continue;
        }
        if let Some(col) = dataset.column_at(index) {
            out.tree.insert(group, label, Field::Vector(gather(col, rows)));
        }
    }
}

fn gather(column: &[f64], rows: &[usize]) -> Vec<f64> {
    rows.iter().map(|&r| column[r]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Headers;

    fn dataset(with_velocity: bool) -> Dataset {
        let mut labels = vec!["x", "y", "z", "h"];
        let mut columns = vec![
            vec![0.0, 1.0, 2.0],
            vec![10.0, 11.0, 12.0],
            vec![20.0, 21.0, 22.0],
            vec![0.1, 0.2, 0.3],
        ];
        if with_velocity {
            labels.extend(["vx", "vy", "vz", "divv"]);
            columns.extend([
                vec![-1.0, -2.0, -3.0],
                vec![-4.0, -5.0, -6.0],
                vec![-7.0, -8.0, -9.0],
                vec![0.5, 0.6, 0.7],
            ]);
        }
        let headers: Headers = [("time", 1.5), ("gamma", 1.4)].into_iter().collect();
        Dataset::from_columns(&labels, columns, vec![1.0, 3.0, 1.0], headers).unwrap()
    }

    fn bundles() -> Vec<Bundle> {
        vec![
            Bundle::new("xyz", &["x", "y", "z"]),
            Bundle::new("vxyz", &["vx", "vy", "vz"]).with_companions(&["divv"]),
        ]
    }

    #[test]
    fn header_group_is_verbatim() {
        let ds = dataset(false);
        let out = export(&ds, &[], &[]);
        let header = out.tree.group(HEADER_GROUP).unwrap();
        assert_eq!(header.len(), 2);
        assert_eq!(header["time"], Field::Scalar(1.5));
    }

    #[test]
    fn bundles_replace_their_source_columns() {
        let ds = dataset(true);
        let out = export(
            &ds,
            &[CategoryRows { name: "particles", rows: &[0, 2] }],
            &bundles(),
        );
        assert!(out.warnings.is_empty());

        let group = out.tree.group("particles").unwrap();
        let names: Vec<&str> = group.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["divv", "h", "itype", "vxyz", "xyz"]);

        let xyz = &group["xyz"];
        assert_eq!(xyz.block_row(1), Some(&[2.0, 12.0, 22.0][..]));
        assert_eq!(group["divv"].as_vector(), Some(&[0.5, 0.7][..]));
    }

    #[test]
    fn missing_velocity_bundle_is_skipped_not_fatal() {
        let ds = dataset(false);
        let out = export(
            &ds,
            &[CategoryRows { name: "particles", rows: &[0, 1, 2] }],
            &bundles(),
        );
        let group = out.tree.group("particles").unwrap();
        assert!(group.contains_key("xyz"));
        assert!(!group.contains_key("vxyz"));
        assert!(group.contains_key("h"));
        assert!(group.contains_key("itype"));
        assert_eq!(
            out.warnings,
            vec![ExportWarning::MissingField {
                group: "particles".into(),
                field: "vxyz".into(),
                column: "vx".into(),
            }]
        );
    }

    #[test]
    fn empty_category_gets_no_group() {
        let ds = dataset(false);
        let out = export(
            &ds,
            &[
                CategoryRows { name: "sinks", rows: &[] },
                CategoryRows { name: "particles", rows: &[0, 1, 2] },
            ],
            &[],
        );
        assert_eq!(out.tree.group_names(), vec!["header", "particles"]);
    }

    #[test]
    fn missing_companion_only_drops_companion() {
        let ds = Dataset::from_columns(
            &["vx", "vy", "vz"],
            vec![vec![1.0], vec![2.0], vec![3.0]],
            vec![1.0],
            Headers::new(),
        )
        .unwrap();
        let out = export(&ds, &[CategoryRows { name: "p", rows: &[0] }], &bundles()[1..]);
        assert!(out.tree.field("p", "vxyz").is_some());
        assert!(out.tree.field("p", "divv").is_none());
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn fields_are_never_overwritten() {
        let mut tree = ExportTree::new();
        assert!(tree.insert("g", "a", Field::Scalar(1.0)));
        assert!(!tree.insert("g", "a", Field::Scalar(2.0)));
        assert_eq!(tree.field("g", "a"), Some(&Field::Scalar(1.0)));
    }

    #[test]
    fn json_output_nests_groups() {
        let ds = dataset(false);
        let out = export(&ds, &[CategoryRows { name: "particles", rows: &[1] }], &bundles()[..1]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        out.tree.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["header"]["time"], serde_json::json!(1.5));
        assert_eq!(value["particles"]["xyz"]["rows"], serde_json::json!(1));
        assert_eq!(value["particles"]["h"], serde_json::json!([0.2]));

        let back: ExportTree = serde_json::from_str(&text).unwrap();
        assert_eq!(back, out.tree);
    }

    #[test]
    fn non_finite_values_survive_json() {
        let mut tree = ExportTree::new();
        tree.insert(HEADER_GROUP, "tmax", Field::Scalar(f64::INFINITY));
        tree.insert("particles", "divv", Field::Vector(vec![1.0, f64::NAN, f64::NEG_INFINITY]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonfinite.json");
        tree.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["header"]["tmax"], serde_json::json!("Infinity"));
        assert_eq!(value["particles"]["divv"], serde_json::json!([1.0, "NaN", "-Infinity"]));

        let back = ExportTree::read_json(&path).unwrap();
        assert_eq!(back.field(HEADER_GROUP, "tmax"), Some(&Field::Scalar(f64::INFINITY)));
        let divv = back.field("particles", "divv").unwrap().as_vector().unwrap();
        assert_eq!(divv[0], 1.0);
        assert!(divv[1].is_nan());
        assert_eq!(divv[2], f64::NEG_INFINITY);
    }

    #[test]
    fn unknown_strings_are_not_numbers() {
        let parsed = serde_json::from_str::<ExportTree>(r#"{"header": {"time": "soon"}}"#);
        assert!(parsed.is_err());
        let missing = ExportTree::read_json(Path::new("/nonexistent/tree.json"));
        assert!(matches!(missing, Err(SnapshotError::NotFound(_))));
    }
}
