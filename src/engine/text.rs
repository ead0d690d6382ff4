use std::path::{Path, PathBuf};

use super::{Engine, EngineStatus, ReadRequest, Routine};
use crate::read::codec::FixedWidth;
use crate::read::CATEGORY_LABEL;

/// Particle type assigned when a file carries no type column (gas).
pub const DEFAULT_TYPE: f64 = 1.0;

const FORMATS: &[&str] = &["ascii", "csv"];

// ---------------------------------------------------------------------------
// Decoded text snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct TextSnapshot {
    path: PathBuf,
    format: String,
    labels: Vec<String>,
    /// Physical columns followed by the type column.
    columns: Vec<Vec<f64>>,
    tags: Vec<String>,
    values: Vec<f64>,
}

impl TextSnapshot {
    fn npart(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// TextEngine
// ---------------------------------------------------------------------------

/// Pure-Rust engine for the plain-text dump formats.
///
/// * `ascii` – whitespace separated columns, `#` comment lines. The last
///   comment line holding one token per column names the columns.
/// * `csv`   – a header row of labels followed by comma separated rows.
///
/// In both, a comment of the form `# tag = value` is a header entry, and a
/// column labelled `itype` is taken as the particle type column. Files
/// without one get type [`DEFAULT_TYPE`] for every row.
#[derive(Debug, Default)]
pub struct TextEngine {
    last: Option<TextSnapshot>,
    /// `last` came from a discovery call the next fill may reuse.
    discovered: bool,
    quiet: bool,
}

impl TextEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostic channel of the engine; silenced by [`super::QuietScope`].
    fn diagnostic(&self, message: &str) {
        log::debug!("text engine: {message}");
        if !self.quiet {
            eprintln!("{message}");
        }
    }

    /// Parse `request.path` unless this is the fill straight after a
    /// discovery of the same file and format.
    fn load(&mut self, request: &ReadRequest) -> Result<(), String> {
        let reuse = !request.header_only
            && self.discovered
            && self
                .last
                .as_ref()
                .is_some_and(|s| s.path == request.path && s.format == request.format);
        self.discovered = false;
        if reuse {
            return Ok(());
        }

        self.last = None;
        let text = std::fs::read_to_string(&request.path)
            .map_err(|e| format!("cannot read {}: {e}", request.path.display()))?;
        let mut parsed = match request.format.to_ascii_lowercase().as_str() {
            "ascii" => parse_ascii(&text, &request.path)?,
            "csv" => parse_csv(&text, &request.path)?,
            other => return Err(format!("format `{other}` not handled by the text engine")),
        };
        parsed.format = request.format.clone();
        self.last = Some(parsed);
        self.discovered = request.header_only;
        Ok(())
    }
}

impl Engine for TextEngine {
    fn read_data(
        &mut self,
        request: &ReadRequest,
        buffer: &mut [f64],
        npart: &mut usize,
        ncol: &mut usize,
    ) -> EngineStatus {
        if request.verbose {
            self.diagnostic(&format!("reading {} ({})", request.path.display(), request.format));
        }
        let routine = if request.header_only {
            Routine::Discover
        } else {
            Routine::Fill
        };
        if let Err(message) = self.load(request) {
            self.diagnostic(&format!("error in {routine}: {message}"));
            return EngineStatus::FAILED;
        }
        let Some(snapshot) = self.last.as_ref() else {
            return EngineStatus::FAILED;
        };
        let (n, m) = (snapshot.npart(), snapshot.columns.len());

        if !request.header_only {
            if buffer.len() != n * m || *npart != n || *ncol != m {
                self.diagnostic(&format!(
                    "error in {routine}: buffer holds {} values, file has {n} x {m}",
                    buffer.len()
                ));
                return EngineStatus::FAILED;
            }
            if n > 0 {
                for (dst, src) in buffer.chunks_exact_mut(n).zip(&snapshot.columns) {
                    dst.copy_from_slice(src);
                }
            }
        }

        *npart = n;
        *ncol = m;
        EngineStatus::OK
    }

    fn labels(&mut self, block: &mut [u8], ncol: usize) -> EngineStatus {
        let Some(snapshot) = &self.last else {
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
        let Some(snapshot) = &self.last else {
            return EngineStatus::FAILED;
        };
        *ntags = snapshot.tags.len();
        *nvals = snapshot.values.len();
        EngineStatus::OK
    }

    fn headers(&mut self, tags: &mut [u8], values: &mut [f64]) -> EngineStatus {
        let Some(snapshot) = &self.last else {
            return EngineStatus::FAILED;
        };
        if values.len() != snapshot.values.len()
            || FixedWidth::TAGS.encode_into(&snapshot.tags, tags).is_err()
        {
            return EngineStatus::FAILED;
        }
        values.copy_from_slice(&snapshot.values);
        EngineStatus::OK
    }

    fn set_quiet(&mut self, quiet: bool) -> bool {
        std::mem::replace(&mut self.quiet, quiet)
    }

    fn supports_format(&self, format: &str) -> bool {
        FORMATS.iter().any(|f| f.eq_ignore_ascii_case(format))
    }

    fn formats(&self) -> &[&'static str] {
        FORMATS
    }
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

/// `tag = value` inside a comment line.
fn parse_header_comment(comment: &str) -> Option<(String, f64)> {
    let (tag, value) = comment.split_once('=')?;
    let tag = tag.trim();
    if tag.is_empty() || value.contains('=') {
        return None;
    }
    let value = value.trim().parse::<f64>().ok()?;
    Some((tag.to_string(), value))
}

fn parse_ascii(text: &str, path: &Path) -> Result<TextSnapshot, String> {
    let mut snapshot = TextSnapshot {
        path: path.to_path_buf(),
        ..Default::default()
    };
    let mut comments: Vec<&str> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            match parse_header_comment(comment) {
                Some((tag, value)) => {
                    snapshot.tags.push(tag);
                    snapshot.values.push(value);
                }
                None => comments.push(comment.trim()),
            }
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|_| format!("line {}: `{tok}` is not a number", line_no + 1))
            })
            .collect::<Result<Vec<f64>, String>>()?;
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(format!(
                    "line {}: {} columns, expected {}",
                    line_no + 1,
                    row.len(),
                    first.len()
                ));
            }
        }
        rows.push(row);
    }

    let width = rows.first().map_or(0, Vec::len);
    let labels = comments
        .iter()
        .rev()
        .map(|c| c.split_whitespace().collect::<Vec<_>>())
        .find(|tokens| width > 0 && tokens.len() == width)
        .map(|tokens| tokens.into_iter().map(str::to_string).collect())
        .unwrap_or_else(|| (1..=width).map(|i| format!("column {i}")).collect());

    let columns = (0..width)
        .map(|c| rows.iter().map(|r| r[c]).collect())
        .collect();
    attach_type_column(&mut snapshot, labels, columns, rows.len());
    Ok(snapshot)
}

fn parse_csv(text: &str, path: &Path) -> Result<TextSnapshot, String> {
    let mut snapshot = TextSnapshot {
        path: path.to_path_buf(),
        ..Default::default()
    };
    for comment in text.lines().filter_map(|l| l.trim().strip_prefix('#')) {
        if let Some((tag, value)) = parse_header_comment(comment) {
            snapshot.tags.push(tag);
            snapshot.values.push(value);
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let labels: Vec<String> = reader
        .headers()
        .map_err(|e| format!("reading CSV header: {e}"))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); labels.len()];
    let mut npart = 0;
    for (row_no, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("CSV row {row_no}: {e}"))?;
        for (col, field) in columns.iter_mut().zip(record.iter()) {
            let value = field
                .parse::<f64>()
                .map_err(|_| format!("CSV row {row_no}: `{field}` is not a number"))?;
            col.push(value);
        }
        npart += 1;
    }
    attach_type_column(&mut snapshot, labels, columns, npart);
    Ok(snapshot)
}

/// Move an `itype` column to the end, or append a default one.
fn attach_type_column(
    snapshot: &mut TextSnapshot,
    mut labels: Vec<String>,
    mut columns: Vec<Vec<f64>>,
    npart: usize,
) {
    let itype = match labels.iter().position(|l| l == CATEGORY_LABEL) {
        Some(idx) => {
            labels.remove(idx);
            columns.remove(idx)
        }
        None => vec![DEFAULT_TYPE; npart],
    };
    columns.push(itype);
    snapshot.labels = labels;
    snapshot.columns = columns;
}
