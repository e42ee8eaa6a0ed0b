//! Codeweave CLI - parse and ingest files into code-graph nodes and edges

use clap::{Parser, Subcommand};
use codeweave::adapter::Dispatcher;
use codeweave::config::{IngestConfig, default_config_path, load_config, write_config};
use codeweave::ui;
use codeweave::{IngestPipeline, ParseResult};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "codeweave")]
#[command(version)]
#[command(about = "Polyglot ingestion pipeline - turns source, markup and config files into graph nodes and edges")]
#[command(long_about = r#"
Codeweave parses source, markup, configuration and infrastructure files into
one entity/relationship schema for a downstream memory or search backend.

Example usage:
  codeweave parse src/Program.cs package.json
  codeweave ingest --path ./repo --output graph.json
  codeweave init
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./codeweave.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse individual files and print what was extracted
    Parse {
        /// Files to parse
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Logical grouping label stamped on every entity
        #[arg(long)]
        context: Option<String>,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Walk a directory and parse every supported file concurrently
    Ingest {
        /// Directory (or single file) to ingest
        #[arg(short, long)]
        path: PathBuf,

        /// Logical grouping label (defaults to the directory name)
        #[arg(long)]
        context: Option<String>,

        /// Worker threads (defaults to the config, then available cores)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Extra gitignore-style patterns to skip
        #[arg(long = "ignore")]
        ignores: Vec<String>,

        /// Write the full report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a default codeweave.toml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_config(cli.config.as_deref())?.unwrap_or_default();

    match cli.command {
        Commands::Parse { files, context, json } => run_parse(&config, &files, context.as_deref(), json),
        Commands::Ingest {
            path,
            context,
            workers,
            ignores,
            output,
        } => run_ingest(config, &path, context, workers, &ignores, output.as_deref()),
        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(default_config_path);
            write_config(&path, &IngestConfig::default(), force)?;
            ui::success(&format!("Wrote {}", path.display()));
            Ok(())
        }
    }
}

fn run_parse(config: &IngestConfig, files: &[PathBuf], context: Option<&str>, json: bool) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(config, config.exclusion_list());
    let results: Vec<(String, ParseResult)> = files
        .iter()
        .map(|path| (path.display().to_string(), dispatcher.parse_file(path, context, None)))
        .collect();

    if json {
        let payload: Vec<_> = results
            .iter()
            .map(|(path, result)| serde_json::json!({ "path": path, "result": result }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for (path, result) in &results {
        ui::print_result(path, result);
    }
    Ok(())
}

fn run_ingest(
    mut config: IngestConfig,
    path: &Path,
    context: Option<String>,
    workers: Option<usize>,
    ignores: &[String],
    output: Option<&Path>,
) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("path does not exist: {}", path.display());
    }
    config.context = context.or(config.context).or_else(|| {
        path.canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
    });
    if workers.is_some() {
        config.workers = workers;
    }

    ui::header(&format!("Ingesting {}", path.display()));
    ui::info("Context", config.context.as_deref().unwrap_or("default"));
    ui::info("Workers", &config.worker_count().to_string());

    let pipeline = IngestPipeline::new(&config);
    let (files, skipped) = pipeline.collect(path, ignores);
    let progress = ui::IngestProgress::new(files.len());
    let mut report = pipeline.run_with_progress(&files, |message| progress.handle(message));
    report.skipped = skipped;
    progress.finish_with_summary(&report);

    println!(
        "{}",
        ui::stats_table(&[
            ("Files parsed", report.files.len().to_string()),
            ("Files skipped", report.skipped.to_string()),
            ("Entities", report.entity_count().to_string()),
            ("Relationships", report.relationship_count().to_string()),
            ("Files with errors", report.files_with_errors().count().to_string()),
            ("Partial results", report.partial_count().to_string()),
        ])
    );

    for file in report.files_with_errors() {
        for message in &file.result.errors {
            ui::warn(message);
        }
    }

    if let Some(output) = output {
        std::fs::write(output, serde_json::to_string_pretty(&report)?)?;
        ui::success(&format!("Wrote report to {}", output.display()));
    }
    Ok(())
}
