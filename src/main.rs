use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use splash_dump::engine::{Engine, TextEngine};
use splash_dump::export::{Export, ExportPolicy, ExportTree, Field};
use splash_dump::{Dataset, ReadOptions, SnapshotReader};

#[cfg(feature = "splash-ffi")]
const DEFAULT_FORMAT: &str = "phantom";
#[cfg(not(feature = "splash-ffi"))]
const DEFAULT_FORMAT: &str = "csv";

#[derive(Parser)]
#[command(
    name = "splash-dump",
    about = "Read an SPH snapshot, summarise it and export it",
    version
)]
struct Cli {
    /// Snapshot file, or a previous export with `--inspect`
    file: PathBuf,

    /// Treat FILE as an export written by this tool and list its groups
    #[arg(long, conflicts_with_all = ["json", "parquet", "csv", "preview", "policy"])]
    inspect: bool,

    /// Format tag (phantom, gadget, ascii, csv, …)
    #[arg(long, short = 'f', default_value = DEFAULT_FORMAT)]
    format: String,

    /// Particle count, when known (skips size discovery)
    #[arg(long, requires = "ncol")]
    npart: Option<usize>,

    /// Column count including the particle-type column
    #[arg(long, requires = "npart")]
    ncol: Option<usize>,

    /// Show the engine's own diagnostics
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Export policy: `phantom`, `flat`, or a JSON policy file
    #[arg(long)]
    policy: Option<String>,

    /// Write the hierarchical export as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the hierarchical export as HDF5
    #[cfg(feature = "hdf5")]
    #[arg(long)]
    hdf5: Option<PathBuf>,

    /// Write the table as Parquet
    #[arg(long)]
    parquet: Option<PathBuf>,

    /// Write the table as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Print the first ROWS rows of the table
    #[arg(long, value_name = "ROWS")]
    preview: Option<usize>,
}

/// The text engine handles its own formats; everything else needs the
/// native library.
#[cfg(feature = "splash-ffi")]
fn engine_for(format: &str) -> Result<Box<dyn Engine>> {
    let text = TextEngine::new();
    if text.supports_format(format) {
        return Ok(Box::new(text));
    }
    let lib = splash_dump::engine::SplashLib::acquire()
        .context("acquiring the native read library")?;
    Ok(Box::new(lib))
}

#[cfg(not(feature = "splash-ffi"))]
fn engine_for(_format: &str) -> Result<Box<dyn Engine>> {
    Ok(Box::new(TextEngine::new()))
}

fn resolve_policy(cli: &Cli) -> Result<ExportPolicy> {
    match &cli.policy {
        None => Ok(ExportPolicy::for_format(&cli.format)),
        Some(arg) => {
            let path = PathBuf::from(arg);
            if path.is_file() {
                ExportPolicy::from_json_file(&path)
                    .with_context(|| format!("loading export policy {}", path.display()))
            } else {
                Ok(ExportPolicy::named(arg)?)
            }
        }
    }
}

/// An HDF5 export when the file carries the signature, JSON otherwise.
#[cfg(feature = "hdf5")]
fn load_export(path: &Path) -> Result<ExportTree> {
    match ExportTree::read_hdf5(path) {
        Err(splash_dump::SnapshotError::NotHdf5(_)) => Ok(ExportTree::read_json(path)?),
        other => Ok(other?),
    }
}

#[cfg(not(feature = "hdf5"))]
fn load_export(path: &Path) -> Result<ExportTree> {
    Ok(ExportTree::read_json(path)?)
}

fn print_groups(tree: &ExportTree) {
    println!("groups:");
    for (name, fields) in tree.groups() {
        let rows = fields
            .values()
            .find_map(|f| match f {
                Field::Vector(v) => Some(v.len()),
                Field::Block { rows, .. } => Some(*rows),
                Field::Scalar(_) => None,
            })
            .unwrap_or(0);
        println!("  {name:<12} {} fields, {rows} rows", fields.len());
    }
}

fn print_summary(dataset: &Dataset, export: &Export) {
    println!("{dataset}");
    println!("columns: {}", dataset.labels().join(", "));
    if !dataset.headers().is_empty() {
        println!("header:");
        for (tag, value) in dataset.headers().iter() {
            println!("  {tag:<16} {value}");
        }
    }
    print_groups(&export.tree);
    for warning in &export.warnings {
        println!("warning: {warning}");
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.inspect {
        let tree = load_export(&cli.file)
            .with_context(|| format!("reading export {}", cli.file.display()))?;
        print_groups(&tree);
        return Ok(());
    }

    let mut options = ReadOptions::new(&cli.format).verbose(cli.verbose);
    if let (Some(npart), Some(ncol)) = (cli.npart, cli.ncol) {
        options = options.with_shape(npart, ncol);
    }

    let reader = SnapshotReader::new(engine_for(&cli.format)?);
    let dataset = reader
        .read(&cli.file, &options)
        .with_context(|| format!("reading {}", cli.file.display()))?;

    let policy = resolve_policy(&cli)?;
    let export = policy.apply(&dataset);
    print_summary(&dataset, &export);

    if let Some(rows) = cli.preview {
        println!("{}", dataset.preview(rows)?);
    }
    if let Some(path) = &cli.json {
        export
            .tree
            .write_json(path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    #[cfg(feature = "hdf5")]
    if let Some(path) = &cli.hdf5 {
        export
            .tree
            .write_hdf5(path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &cli.parquet {
        dataset
            .write_parquet(path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &cli.csv {
        dataset
            .write_csv(path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
