use std::path::Path;

use super::codec::FixedWidth;
use crate::data::model::Headers;
use crate::engine::{Engine, QuietScope, Routine};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Column labels
// ---------------------------------------------------------------------------

/// Fetch the `ncol_physical` labels of the last load, trimmed of padding.
///
/// Labels come back exactly as the engine names them; empty or repeated
/// labels are left for the caller to sort out.
pub fn resolve_labels<E: Engine + ?Sized>(
    engine: &mut E,
    ncol_physical: usize,
    path: &Path,
    verbose: bool,
) -> Result<Vec<String>> {
    if ncol_physical == 0 {
        return Ok(Vec::new());
    }
    let mut block = FixedWidth::LABELS.blank(ncol_physical);
    let status = {
        let mut engine = QuietScope::engage(engine, verbose);
        engine.labels(&mut block, ncol_physical)
    };
    status.check(Routine::Labels, path)?;
    FixedWidth::LABELS.decode(&block)
}

// ---------------------------------------------------------------------------
// Header tags and values
// ---------------------------------------------------------------------------

/// Fetch the header of the last load: sizes first, then both arrays in a
/// single call.
pub fn resolve_headers<E: Engine + ?Sized>(
    engine: &mut E,
    path: &Path,
    verbose: bool,
) -> Result<Headers> {
    let mut engine = QuietScope::engage(engine, verbose);

    let (mut ntags, mut nvals) = (0usize, 0usize);
    engine
        .header_sizes(&mut ntags, &mut nvals)
        .check(Routine::HeaderSizes, path)?;

    let mut tags = FixedWidth::TAGS.blank(ntags);
    let mut values = vec![0.0; nvals];
    engine
        .headers(&mut tags, &mut values)
        .check(Routine::Headers, path)?;
    drop(engine);

    let tags = FixedWidth::TAGS.decode(&tags)?;
    if tags.len() != values.len() {
        log::debug!(
            "{}: {} header tags but {} values; pairing positionally",
            path.display(),
            tags.len(),
            values.len()
        );
    }
    Ok(clean_headers(&tags, &values))
}

/// Pair tags with values by position, drop blank tags, and keep the first
/// value seen for a repeated tag.
pub fn clean_headers<S: AsRef<str>>(tags: &[S], values: &[f64]) -> Headers {
    let mut headers = Headers::new();
    for (tag, &value) in tags.iter().zip(values) {
        let tag = tag.as_ref().trim();
        if tag.is_empty() {
            continue;
        }
        if !headers.insert_if_absent(tag, value) {
            log::debug!("duplicate header tag `{tag}` ignored (keeping first value)");
        }
    }
    headers
}
