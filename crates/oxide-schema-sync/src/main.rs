//! oxide-schema-sync CLI
//!
//! Command-line tool for generating reversible schema migrations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema_sync::prelude::*;

/// Reversible schema migrations for SQLite-class engines.
#[derive(Parser)]
#[command(name = "oxide-schema-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Generator configuration file (JSON).
    #[arg(short, long, env = "OXIDE_SCHEMA_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Identifier quote character, overriding the configuration.
    #[arg(long)]
    quote: Option<char>,

    /// Fail instead of skipping statements that cannot be rolled back.
    #[arg(long)]
    strict: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Sql,
    Json,
}

#[derive(clap::Args)]
struct Source {
    /// Schema document with `schemas` and optionally `tables`.
    #[arg(short, long)]
    input: PathBuf,

    /// Logical schema names (all schemas in the document if not specified).
    #[arg(short, long)]
    schema: Vec<String>,

    /// Read live tables from this SQLite database instead of the document.
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Introspection timeout in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate forward and rollback SQL.
    Generate {
        #[command(flatten)]
        source: Source,

        /// Migration name.
        #[arg(short, long)]
        name: Option<String>,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "sql")]
        format: Format,
    },

    /// Print the schema diff as JSON.
    Diff {
        #[command(flatten)]
        source: Source,
    },

    /// Print the live columns and indexes of a SQLite table as JSON.
    Inspect {
        /// Database URL.
        #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
        database: String,

        /// Table to inspect (lists tables if not specified).
        #[arg(short, long)]
        table: Option<String>,
    },
}

async fn connect(url: &str) -> anyhow::Result<SqliteIntrospector> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await?;
    Ok(SqliteIntrospector::new(pool))
}

/// Loads the document and compares every requested schema.
async fn compare(
    source: &Source,
    config: &GeneratorConfig,
) -> anyhow::Result<BatchComparison> {
    let document = Arc::new(StaticSchemaProvider::from_json_file(&source.input)?);
    let live: Arc<dyn LiveSchemaProvider> = match &source.database {
        Some(url) => Arc::new(connect(url).await?),
        None => document.clone(),
    };
    let engine = SchemaComparisonEngine::new(document.clone(), live, Arc::new(SchemaCache::new()))
        .with_differ(config.differ());

    let names = if source.schema.is_empty() {
        document.schema_names()
    } else {
        source.schema.clone()
    };
    let options = CompareOptions::default().timeout(Some(Duration::from_millis(source.timeout_ms)));
    Ok(engine.batch_compare_with(&names, &options).await)
}

fn report_failures(batch: &BatchComparison) -> anyhow::Result<()> {
    for (name, err) in &batch.errors {
        warn!(schema = %name, code = err.code(), "{err}");
    }
    if batch.success_count == 0 && batch.failure_count > 0 {
        anyhow::bail!("all {} schema comparisons failed", batch.failure_count);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::default(),
    };
    if let Some(quote) = cli.quote {
        config = config.with_quote(quote);
    }
    if cli.strict {
        config = config.with_rollback_mode(RollbackMode::Strict);
    }

    match cli.command {
        Commands::Generate {
            source,
            name,
            format,
        } => {
            let batch = compare(&source, &config).await?;
            report_failures(&batch)?;

            let generator = config.generator();
            let mut migrations = Vec::with_capacity(batch.results.len());
            for (schema, diff) in &batch.results {
                let name = name.clone().unwrap_or_else(|| format!("sync_{schema}"));
                let migration = generator.generate_migration_sql(diff, &name)?;
                for warning in &migration.warnings {
                    warn!(schema = %schema, "{warning}");
                }
                migrations.push(migration);
            }

            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&migrations)?),
                Format::Sql => {
                    for migration in migrations.iter().filter(|m| !m.is_empty()) {
                        println!("-- Migration: {}", migration.metadata.name);
                        println!("-- Forward");
                        println!("{}", migration.forward_script());
                        println!("-- Rollback");
                        println!("{}", migration.rollback_script());
                        println!();
                    }
                }
            }
            let pending = migrations.iter().filter(|m| !m.is_empty()).count();
            info!("{pending} of {} schemas need changes", migrations.len());
        }

        Commands::Diff { source } => {
            let batch = compare(&source, &config).await?;
            report_failures(&batch)?;
            println!("{}", serde_json::to_string_pretty(&batch.results)?);
        }

        Commands::Inspect { database, table } => {
            let introspector = connect(&database).await?;
            match table {
                Some(table) => {
                    let live = introspector.live_table(&table).await?;
                    if live.columns.is_empty() {
                        anyhow::bail!("table `{table}` not found");
                    }
                    println!("{}", serde_json::to_string_pretty(&live)?);
                }
                None => {
                    for table in introspector.list_tables().await? {
                        println!("{table}");
                    }
                }
            }
        }
    }

    Ok(())
}
