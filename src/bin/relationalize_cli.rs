//! relationalize-cli: flatten nested JSON into relational tables with DDL
//!
//! Usage:
//!   # JSON array, single object or NDJSON; writes into ./out
//!   relationalize-cli data.json --object-name users --output-dir ./out
//!
//!   # Target SQL Server and collapse scalar arrays into one column
//!   relationalize-cli events.jsonl --dialect mssql --join-scalar-arrays '|'
//!
//! Layout of the output directory:
//!   temp/<table>.jsonl    flat records as produced by flattening
//!   final/<table>.csv     converted records (or .jsonl with --format jsonl)
//!   DDL_<table>.sql       CREATE TABLE statement per table

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use relationalize::melt::{JsonLinesDir, JsonLinesSink, RecordSink, TableWriter};
use relationalize::output::CsvRowWriter;
use relationalize::schema::Schema;
use relationalize::source;
use relationalize::{DialectKind, MeltConfig, Relationalizer, ScalarArrayPolicy, SchemaSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Jsonl,
}

#[derive(Parser, Debug)]
#[command(name = "relationalize-cli")]
#[command(about = "Flatten nested JSON into relational tables with inferred SQL schemas", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Name of the root table
    #[arg(long, default_value = "root")]
    object_name: String,

    /// Directory receiving flat streams, converted rows and DDL
    #[arg(long, short = 'o', default_value = "output")]
    output_dir: PathBuf,

    /// Target SQL dialect (postgres, mssql)
    #[arg(long, default_value = "postgres")]
    dialect: DialectKind,

    /// Database schema used to qualify table names in DDL (empty for none)
    #[arg(long, default_value = "public")]
    db_schema: String,

    /// Format of the converted rows
    #[arg(long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Separator joining nested keys (default: "_")
    #[arg(long)]
    separator: Option<String>,

    /// Collapse arrays of scalars into one column joined by this delimiter
    #[arg(long, value_name = "DELIM")]
    join_scalar_arrays: Option<String>,

    /// Nesting depth past which values are stored as JSON text (default: 32)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Comma-separated column names that are never expanded
    #[arg(long)]
    scalar_fields: Option<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = melt_config(&args);
    let reader: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(std::io::stdin()),
    };
    let records = source::read_records(reader).context("Failed to read input records")?;

    // Flatten into temp/, building schemas as rows are written
    let temp_dir = args.output_dir.join("temp");
    let factory = JsonLinesDir::new(&temp_dir)
        .with_context(|| format!("Failed to create {}", temp_dir.display()))?;
    let mut writer = TableWriter::new(factory);
    let mut schemas =
        SchemaSet::new(args.dialect.dialect()).with_linkage_columns(config.linkage_columns());
    let mut relationalizer = Relationalizer::new(args.object_name.clone(), config);
    let stats = relationalizer
        .relationalize_observed(records, &mut writer, |table, record| {
            schemas.observe(table, record)
        })
        .context("Failed to relationalize input")?;
    let tables = writer.tables().to_vec();
    let factory = writer.factory().clone();
    drop(writer);

    schemas.finalize_all().context("Failed to finalize schemas")?;

    let final_dir = args.output_dir.join("final");
    std::fs::create_dir_all(&final_dir)
        .with_context(|| format!("Failed to create {}", final_dir.display()))?;

    for table in &tables {
        let Some(schema) = schemas.get(table) else {
            continue;
        };
        let flat_path = factory.path_for(table);
        let rows = convert_table(schema, &flat_path, &final_dir, table, args.format)
            .with_context(|| format!("Failed to convert table {}", table))?;

        let ddl = schema
            .generate_ddl(table, &args.db_schema)
            .with_context(|| format!("Failed to render DDL for {}", table))?;
        let ddl_path = args.output_dir.join(format!("DDL_{}.sql", table));
        std::fs::write(&ddl_path, ddl)
            .with_context(|| format!("Failed to write {}", ddl_path.display()))?;

        info!(
            table = %table,
            rows,
            columns = schema.columns().len(),
            "Wrote table"
        );
    }

    info!(
        records = stats.records,
        rows = stats.rows,
        tables = tables.len(),
        output = %args.output_dir.display(),
        "Done"
    );
    Ok(())
}

fn melt_config(args: &Args) -> MeltConfig {
    let mut config = MeltConfig::default();
    if let Some(sep) = &args.separator {
        config.separator = sep.clone();
    }
    if let Some(delimiter) = &args.join_scalar_arrays {
        config.scalar_arrays = ScalarArrayPolicy::Join {
            delimiter: delimiter.clone(),
        };
    }
    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }
    if let Some(fields) = &args.scalar_fields {
        config.scalar_fields = fields.split(',').map(|s| s.trim().to_string()).collect();
    }
    config
}

/// Replay one persisted flat stream through its schema into final/.
fn convert_table(
    schema: &Schema,
    flat_path: &Path,
    final_dir: &Path,
    table: &str,
    format: OutputFormat,
) -> Result<u64> {
    let flat = BufReader::new(File::open(flat_path)?);

    match format {
        OutputFormat::Csv => {
            let out = BufWriter::new(File::create(final_dir.join(format!("{}.csv", table)))?);
            let mut csv = CsvRowWriter::new(schema, out)?;
            for record in source::read_flat_records(flat) {
                csv.write(&record?)?;
            }
            csv.flush()?;
            Ok(csv.rows())
        }
        OutputFormat::Jsonl => {
            let out = BufWriter::new(File::create(final_dir.join(format!("{}.jsonl", table)))?);
            let mut sink = JsonLinesSink::new(out);
            let mut rows = 0;
            for record in source::read_flat_records(flat) {
                sink.write_record(&schema.convert_object(&record?)?)?;
                rows += 1;
            }
            sink.flush()?;
            Ok(rows)
        }
    }
}
