//! Polyquery CLI - Compile multi-type queries to SQL
//!
//! Usage:
//!   polyquery compile -t <type>... [--columns <spec>] [--order <spec>] [--dialect <dialect>]
//!   polyquery types
//!
//! Examples:
//!   polyquery compile -t article -t blog_post --columns "id, title, author" --limit 20
//!   polyquery compile -t post --where "title LIKE :needle" --param needle=%rust% --dialect tsql
//!   polyquery types

use clap::{Parser, Subcommand, ValueEnum};
use polyquery::compiler::{CompileOptions, QueryCompiler};
use polyquery::config::Settings;
use polyquery::sql::{raw_sql, Dialect};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "polyquery")]
#[command(about = "Polyquery - Compile queries over many typed sources into one SQL statement")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to $POLYQUERY_CONFIG, ./polyquery.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query over one or more types
    Compile(CompileArgs),

    /// List configured types and their tables
    Types,
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Type to include; supertypes expand to their subtypes
    #[arg(short = 't', long = "type")]
    types: Vec<String>,

    /// Global column spec, e.g. "id, UPPER(title) AS title"
    #[arg(long)]
    columns: Option<String>,

    /// Global order spec, e.g. "published_at DESC, id"
    #[arg(long)]
    order: Option<String>,

    /// Raw SQL condition ANDed onto every source
    #[arg(long = "where")]
    filter: Option<String>,

    /// Bound parameter as name=value; the value is parsed as JSON when possible
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// Apply --where to the combined result instead of each source
    #[arg(long)]
    filter_on_result: bool,

    /// Only return the global columns
    #[arg(long)]
    exclude_type_columns: bool,

    /// Do not expand sources to their default columns
    #[arg(long)]
    no_default_columns: bool,

    /// Alternate rows between sources
    #[arg(long)]
    interleave: bool,

    /// Take the union path even for one source
    #[arg(long)]
    force_union: bool,

    #[arg(long)]
    limit: Option<u64>,

    #[arg(long)]
    offset: Option<u64>,

    #[arg(long)]
    top: Option<u64>,

    /// SQL dialect to generate (defaults to the configured dialect)
    #[arg(short, long)]
    dialect: Option<DialectArg>,

    /// Output format
    #[arg(short, long, default_value = "sql")]
    output: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Duckdb,
    Postgres,
    Mysql,
    Tsql,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Tsql => Dialect::TSql,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Output SQL only
    Sql,
    /// Output SQL with plan, parameters and total-count SQL as comments
    Verbose,
    /// Output everything as one JSON object
    Json,
}

fn parse_param(arg: &str) -> Result<(String, Value), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", arg))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polyquery=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Compile(args) => cmd_compile(&settings, args),
        Commands::Types => cmd_types(&settings),
    }
}

fn cmd_compile(settings: &Settings, args: CompileArgs) -> ExitCode {
    let mut compiler = match QueryCompiler::from_settings(settings) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = configure(&mut compiler, &args) {
        eprintln!("Invalid query: {}", e);
        return ExitCode::FAILURE;
    }

    let mut options = CompileOptions::new();
    if let Some(dialect) = args.dialect {
        options = options.dialect(dialect.into());
    }
    if args.force_union {
        options = options.force_union();
    }

    let compiled = match compiler.compile(&options) {
        Ok(Some(compiled)) => compiled,
        Ok(None) => {
            eprintln!("Nothing to compile: no types given and no [default] source configured");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.output {
        OutputFormat::Sql => {
            println!("{}", compiled.sql);
        }
        OutputFormat::Verbose => {
            println!("-- Polyquery Compiled SQL");
            println!("-- Plan: {}", compiled.kind);
            println!("-- Dialect: {}", compiled.dialect);
            println!("-- Columns: {}", compiled.columns.join(", "));
            if !compiled.params.is_empty() {
                println!("-- Parameters: {}", compiled.params.to_json());
            }
            println!();
            println!("{}", compiled.sql);
            if let Some(count_sql) = compiled.total_count_sql() {
                println!();
                println!("-- Total count");
                println!("{}", count_sql);
            }
        }
        OutputFormat::Json => {
            let out = serde_json::json!({
                "plan": compiled.kind.to_string(),
                "dialect": compiled.dialect.to_string(),
                "columns": compiled.columns,
                "sql": compiled.sql,
                "params": compiled.params,
                "total_count_sql": compiled.total_count_sql(),
            });
            match serde_json::to_string_pretty(&out) {
                Ok(s) => println!("{}", s),
                Err(e) => {
                    eprintln!("Error writing JSON: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }
    ExitCode::SUCCESS
}

fn configure(
    compiler: &mut QueryCompiler,
    args: &CompileArgs,
) -> polyquery::CompileResult<()> {
    for name in &args.types {
        compiler.register_type(name)?;
    }
    if let Some(spec) = &args.columns {
        compiler.set_columns(spec)?;
    }
    if let Some(spec) = &args.order {
        compiler.order_by(spec)?;
    }
    if let Some(condition) = &args.filter {
        compiler.filter(raw_sql(condition));
    }
    for (name, value) in &args.params {
        compiler.param(name, value.clone());
    }
    if args.filter_on_result {
        compiler.filter_on_result();
    }
    if args.exclude_type_columns {
        compiler.exclude_type_columns();
    }
    if args.no_default_columns {
        compiler.no_default_columns();
    }
    if args.interleave {
        compiler.interleave_sources();
    }
    if let Some(limit) = args.limit {
        compiler.max_records(limit);
    }
    if let Some(offset) = args.offset {
        compiler.offset(offset);
    }
    if let Some(top) = args.top {
        compiler.top(top);
    }
    Ok(())
}

fn cmd_types(settings: &Settings) -> ExitCode {
    if settings.types.is_empty() {
        println!("No types configured.");
        return ExitCode::SUCCESS;
    }

    println!("Types:");
    for (name, ts) in &settings.types {
        if ts.subtypes.is_empty() {
            let table = ts.table_ref(name);
            let table = match &table.schema {
                Some(schema) => format!("{}.{}", schema, table.table),
                None => table.table.clone(),
            };
            println!("  - {} (table: {}, columns: {})", name, table, ts.columns.len());
        } else {
            println!("  - {} (subtypes: {})", name, ts.subtypes.join(", "));
        }
    }

    if let Some(default) = &settings.default {
        println!();
        println!(
            "Default source: {}",
            default.table.as_deref().unwrap_or("(no table)")
        );
    }
    ExitCode::SUCCESS
}
