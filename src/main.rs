//! papersift CLI entry point

use clap::{Parser, Subcommand};
use papersift::{
    catalog::ArxivClient,
    commands::{
        cmd_db_init, cmd_db_status, cmd_index, cmd_init, cmd_pdf, cmd_search, cmd_show,
        print_document, print_indexing_report, print_init_summary, print_pdf_download,
        print_schema_info, print_search_results, print_store_stats, InitOptions,
    },
    config::Config,
    error::Result,
    store::{DocumentStore, PgDocumentStore},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "papersift")]
#[command(version, about = "Index arXiv papers into PostgreSQL and search them semantically", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "PAPERSIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Manage the PostgreSQL schema
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Fetch papers by arXiv id and store them with embeddings
    Index {
        /// arXiv ids, e.g. 2107.05580 or arXiv:hep-th/9901001v2
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Semantic search over stored summaries
    Search {
        /// The search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show a stored document
    Show {
        /// arXiv id as stored, including version
        id: String,
    },

    /// Download a paper's PDF
    Pdf {
        /// arXiv id
        id: String,

        /// Output file (defaults to <id>.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Database management actions
#[derive(Subcommand)]
enum DbAction {
    /// Create extensions, tables and indexes
    Init,

    /// Show table row counts
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, json_logs: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current step");
            token.cancel();
        }
    });
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    // Init doesn't need an existing config
    if let Commands::Init { force } = cli.command {
        return handle_init(cli.config, force, cli.json);
    }

    let config = load_config(cli.config.as_deref())?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Db { action } => {
            let store = PgDocumentStore::connect(&config.database).await?;
            match action {
                DbAction::Init => {
                    let info = cmd_db_init(&config, &store).await?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&info)?);
                    } else {
                        print_schema_info(&info);
                    }
                }
                DbAction::Status => {
                    let stats = cmd_db_status(&store).await?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&stats)?);
                    } else {
                        print_store_stats(&stats);
                    }
                }
            }
        }

        Commands::Index { ids } => {
            let store = connect_store(&config).await?;
            let catalog = Arc::new(ArxivClient::new(&config.catalog)?);

            let report = cmd_index(&config, store, catalog, ids, &cancel).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_indexing_report(&report);
            }
        }

        Commands::Search { query, top_k } => {
            let store = connect_store(&config).await?;
            let response = cmd_search(&config, store, &query, top_k, &cancel).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_search_results(&query, &response);
            }
        }

        Commands::Show { id } => {
            let store = connect_store(&config).await?;
            let document = cmd_show(store.as_ref(), &id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                print_document(&document);
            }
        }

        Commands::Pdf { id, output } => {
            let catalog = ArxivClient::new(&config.catalog)?;
            let download = cmd_pdf(&catalog, &id, output, &cancel).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&download)?);
            } else {
                print_pdf_download(&download);
            }
        }
    }

    Ok(())
}

fn handle_init(config: Option<PathBuf>, force: bool, json: bool) -> Result<()> {
    // A .toml path names the file; anything else names the directory
    let (base_dir, config_path) = match config {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => (dir.clone(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    };

    let config = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print_init_summary(&config);
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'papersift init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}

async fn connect_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    Ok(Arc::new(PgDocumentStore::connect(&config.database).await?))
}
