//! CLI entry point for the municipality search service.
//!
//! Provides commands for inspecting the loaded snapshots, running one-off
//! searches, and serving the HTTP API.

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use munisearch::display::{THEME, create_results_table, create_stats_table};
use munisearch::service::loader;
use munisearch::{IndexStats, Query, ScoredResult, SearchError, SearchService, Settings};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic municipality search
#[derive(Parser)]
#[command(
    name = "munisearch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Semantic search over municipality embeddings",
    long_about = "Rank municipalities by similarity to free-text queries over a pre-computed embedding matrix.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .munisearch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .munisearch/settings.toml")]
    Config,

    /// Load the snapshots and print a summary
    #[command(about = "Check the embedding matrix, mapping and metadata without loading the model")]
    Info {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search municipalities by free text
    #[command(
        about = "Rank municipalities against a free-text query",
        after_help = "Examples:\n  munisearch search \"温泉のある観光地\"\n  munisearch search \"港町\" -k 10 --json"
    )]
    Search {
        /// Query text
        query: String,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Drop results scoring below this value
        #[arg(long)]
        min_score: Option<f32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find municipalities similar to a given one
    #[command(about = "Rank municipalities against a stored municipality")]
    Similar {
        /// Municipality code as it appears in the mapping file
        code: String,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start HTTP server
    #[command(
        about = "Serve the search API over HTTP",
        after_help = "Endpoints:\n  POST /search\n  GET  /similar/{code}\n  GET  /health"
    )]
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{}", THEME.error_line(&format!("{e:#}")));
        if let Some(search_error) = e.downcast_ref::<SearchError>() {
            for suggestion in search_error.recovery_suggestions() {
                eprintln!("  {}", THEME.paint(&THEME.dim, suggestion));
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { force } = cli.command {
        let path = Settings::init_config_file(force)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("Failed to create configuration")?;
        println!("Edit {} to point at your snapshot files.", path.display());
        return Ok(());
    }

    if cli.config.is_none() {
        if let Err(warning) = Settings::check_init() {
            eprintln!("{}", THEME.warning_line(&warning));
            eprintln!("Using default configuration for now.");
        }
    }

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Configuration error loading from {}", path.display()))?,
        None => Settings::load().context("Configuration error")?,
    };

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Config => {
            println!("{}", THEME.paint(&THEME.header, "Current Configuration:"));
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
        }

        Commands::Info { json } => {
            let snapshots = loader::load_snapshots(&settings)?;
            let stats = IndexStats {
                rows: snapshots.index.len(),
                dimension: snapshots.index.dimension().get(),
                fingerprint: snapshots.index.matrix().fingerprint().to_string(),
                unknown_rows: snapshots.identifiers.unknown_rows(),
                metadata_records: snapshots.metadata.len(),
                model_name: settings.model.name.clone(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "{}",
                    THEME.paint(
                        &THEME.path,
                        settings.resolve_path(&settings.data.embeddings).display()
                    )
                );
                println!("{}", create_stats_table(&stats));
                if stats.unknown_rows > 0 {
                    eprintln!(
                        "{}",
                        THEME.warning_line(&format!(
                            "{} rows have no code and will be reported as UNKNOWN",
                            stats.unknown_rows
                        ))
                    );
                }
                if stats.metadata_records == 0 {
                    eprintln!(
                        "{}",
                        THEME.warning_line("No metadata loaded; results will have empty names")
                    );
                }
            }
        }

        Commands::Search {
            query,
            top_k,
            min_score,
            json,
        } => {
            let service = ready_service(&settings)?;
            let query = Query {
                text: query,
                top_k,
                min_score,
            };
            let results = service.search(&query)?;
            print_results(&results, json)?;
        }

        Commands::Similar { code, top_k, json } => {
            let service = ready_service(&settings)?;
            let results = service.similar(&code, top_k)?;
            print_results(&results, json)?;
        }

        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            munisearch::http::serve_http(settings, bind).await?;
        }
    }

    Ok(())
}

/// Load everything, including the model, for a one-off query.
fn ready_service(settings: &Settings) -> Result<SearchService, SearchError> {
    let index = loader::load_index(settings)?;
    Ok(SearchService::with_index(index, settings.search.clone()))
}

fn print_results(results: &[ScoredResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "results": results }))?
        );
    } else if results.is_empty() {
        eprintln!("{}", THEME.warning_line("No results"));
    } else {
        println!("{}", create_results_table(results));
    }
    Ok(())
}
