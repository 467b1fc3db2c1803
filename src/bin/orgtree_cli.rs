use clap::{Parser, Subcommand};
use log::{error, info, warn};
use orgtree::config::load_config;
use orgtree::credentials::Argon2SecretHasher;
use orgtree::directory::{DirectoryStore, NodeKind};
use orgtree::seed::seed_default_directory;
use std::path::PathBuf;
use std::sync::Arc;

/// Operator tooling for an orgtree database. Commands act on the store
/// directly and are not subject to caller authorization.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the storage path from the configuration
    #[arg(short, long)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default organization if it is missing
    Seed {},
    /// Print the whole directory tree
    Tree {
        /// Print JSON instead of an indented outline
        #[arg(long)]
        json: bool,
    },
    /// Search names and emails across the directory
    Search {
        #[arg(required = true)]
        term: String,

        /// Restrict to one node kind (DOMAIN, UNIT, GROUP, PRINCIPAL)
        #[arg(short, long)]
        kind: Option<NodeKind>,
    },
    /// Print the ancestors of a node, root first
    Ancestors {
        #[arg(required = true)]
        id: u64,
    },
    /// Check path and index consistency
    Verify {},
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(storage) = cli.storage {
        config.storage_path = storage;
    }
    orgtree::logging::init(&config.log_level);

    info!("Opening directory at {}", config.storage_path.display());
    let store = DirectoryStore::new(config.open_db()?, Arc::new(Argon2SecretHasher::new()))?;

    match cli.command {
        Commands::Seed {} => {
            let report = seed_default_directory(&store)?;
            if report.created == 0 {
                info!("Directory already seeded (root id {})", report.root_id);
            } else {
                info!("Seeded {} nodes under root id {}", report.created, report.root_id);
            }
        }
        Commands::Tree { json } => {
            let forest = store.full_tree()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&forest)?);
            } else if forest.is_empty() {
                warn!("Directory is empty, run `seed` first");
            } else {
                for root in &forest {
                    print!("{}", root.render());
                }
            }
        }
        Commands::Search { term, kind } => {
            let nodes = store.search_flat(&term, kind)?;
            info!("{} match(es) for '{}'", nodes.len(), term);
            for node in nodes {
                println!("{:>6}  {:<10} {:<24} {}", node.id, node.kind, node.name, node.path);
            }
        }
        Commands::Ancestors { id } => {
            for node in store.find_ancestors(id)? {
                println!("{:>6}  {:<10} {}", node.id, node.kind, node.name);
            }
        }
        Commands::Verify {} => {
            let report = store.verify_integrity()?;
            if report.is_consistent() {
                info!("{} nodes checked, no violations", report.checked);
            } else {
                for violation in &report.violations {
                    error!("{}", violation);
                }
                return Err(format!("{} integrity violation(s)", report.violations.len()).into());
            }
        }
    }

    store.flush()?;
    Ok(())
}
