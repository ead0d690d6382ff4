use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use ndarray::Array2;

use super::tree::{ExportTree, Field};
use crate::data::model::Dataset;
use crate::error::{Result, SnapshotError};

/// Format signature at the start of every HDF5 superblock.
const SIGNATURE: [u8; 8] = *b"\x89HDF\r\n\x1a\n";

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

impl ExportTree {
    /// Write every group as an HDF5 group and every field as a dataset.
    /// An existing file at `path` is replaced.
    ///
    /// A `/` inside a name is written as `_`. Names that stay unusable, or
    /// that collide with a sibling once rewritten, fail with
    /// [`SnapshotError::InvalidName`] before the file is created.
    pub fn write_hdf5(&self, path: &Path) -> Result<()> {
        let layout = self.hdf5_layout()?;
        let file = hdf5::File::create(path)?;
        for (name, fields) in layout {
            let group = file.create_group(&name)?;
            for (field_name, field) in fields {
                match field {
                    Field::Scalar(value) => {
                        group
                            .new_dataset::<f64>()
                            .create(field_name.as_str())?
                            .write_scalar(value)?;
                    }
                    Field::Vector(values) => {
                        group
                            .new_dataset_builder()
                            .with_data(values.as_slice())
                            .create(field_name.as_str())?;
                    }
                    Field::Block { rows, cols, data } => {
                        let block = Array2::from_shape_vec((*rows, *cols), data.clone())
                            .map_err(|e| SnapshotError::InvalidLayout(format!("{field_name}: {e}")))?;
                        group
                            .new_dataset_builder()
                            .with_data(&block)
                            .create(field_name.as_str())?;
                    }
                }
            }
        }
        log::info!("wrote HDF5 export to {}", path.display());
        Ok(())
    }

    /// Link names for every group and field, in tree order.
    fn hdf5_layout(&self) -> Result<Vec<(String, Vec<(String, &Field)>)>> {
        let mut groups_seen = HashSet::new();
        let mut layout = Vec::new();
        for (name, fields) in self.groups() {
            let group = link_name("group", name, &mut groups_seen)?;
            let mut fields_seen = HashSet::new();
            let mut links = Vec::with_capacity(fields.len());
            for (field_name, field) in fields {
                links.push((link_name("field", field_name, &mut fields_seen)?, field));
            }
            layout.push((group, links));
        }
        Ok(layout)
    }
}

/// `name` with `/` replaced, rejected when empty, `.`, holding a NUL, or
/// already used by a sibling.
fn link_name(kind: &'static str, name: &str, seen: &mut HashSet<String>) -> Result<String> {
    let link = name.replace('/', "_");
    if link.is_empty() || link == "." || link.contains('\0') || !seen.insert(link.clone()) {
        return Err(SnapshotError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    if link != name {
        log::warn!("HDF5 {kind} `{name}` written as `{link}`");
    }
    Ok(link)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

impl ExportTree {
    /// Rebuild a tree from a file written by [`ExportTree::write_hdf5`].
    ///
    /// Top-level groups become groups; their datasets become scalars,
    /// vectors or row-major blocks by rank. Anything else in the file is
    /// skipped.
    pub fn read_hdf5(path: &Path) -> Result<ExportTree> {
        if !path.exists() {
            return Err(SnapshotError::NotFound(path.to_path_buf()));
        }
        if !has_hdf5_signature(path)? {
            return Err(SnapshotError::NotHdf5(path.to_path_buf()));
        }
        let file = hdf5::File::open(path)?;
        let mut tree = ExportTree::new();
        for group in file.groups()? {
            let group_name = leaf_name(&group.name());
            tree.ensure_group(&group_name);
            for dataset in group.datasets()? {
                let field_name = leaf_name(&dataset.name());
                let field = match dataset.ndim() {
                    0 => Field::Scalar(dataset.read_scalar::<f64>()?),
                    1 => Field::Vector(dataset.read_raw::<f64>()?),
                    2 => {
                        let block = dataset.read_2d::<f64>()?;
                        let (rows, cols) = block.dim();
                        Field::Block {
                            rows,
                            cols,
                            data: block.iter().copied().collect(),
                        }
                    }
                    n => {
                        return Err(SnapshotError::InvalidLayout(format!(
                            "{group_name}/{field_name}: rank {n} dataset has no field form"
                        )))
                    }
                };
                tree.insert(&group_name, &field_name, field);
            }
        }
        log::info!("read {} groups from {}", tree.group_names().len(), path.display());
        Ok(tree)
    }
}

/// Last component of an HDF5 object path.
fn leaf_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// HDF5 looks for the superblock at byte 0, then at 512 and every power
/// of two after it.
fn has_hdf5_signature(path: &Path) -> Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    let mut magic = [0u8; 8];
    let mut offset = 0u64;
    while offset + SIGNATURE.len() as u64 <= len {
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut magic)?;
        if magic == SIGNATURE {
            return Ok(true);
        }
        offset = if offset == 0 { 512 } else { offset * 2 };
    }
    Ok(false)
}

impl Dataset {
    /// Write [`Dataset::hierarchy`] as HDF5.
    pub fn save_hdf5(&self, path: &Path) -> Result<()> {
        if self.format().is_some_and(|f| f.eq_ignore_ascii_case("phantom")) {
            log::warn!("this HDF5 file holds a subset of the dump and cannot restart a Phantom run");
        }
        self.hierarchy().tree.write_hdf5(path)
    }
}
