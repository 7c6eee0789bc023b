//! CLI entry point for kgrefine operator tasks.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use kgrefine_core::{validate, GraphDocument, SessionId};
use kgrefine_graph::{persist_document, GraphClient, GraphConfig};
use kgrefine_journal::store::{FileJournalStore, JournalQuery, JournalStore};

use kgrefine_session::DocumentStats;

#[derive(Parser)]
#[command(name = "kgrefine")]
#[command(about = "Inspect, persist and audit kgrefine graph documents")]
struct Cli {
    /// Config file prefix (default: kgrefine).
    #[arg(short, long, default_value = "kgrefine", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a JSON graph document and print every issue found.
    Validate { file: PathBuf },

    /// Print node and relationship counts by type.
    Stats { file: PathBuf },

    /// Write a validated document to Neo4j.
    Persist {
        file: PathBuf,

        /// Scope tag for the written nodes.
        #[arg(long, default_value = kgrefine_graph::client::DEFAULT_SCOPE)]
        scope: String,

        /// Delete everything previously written under the scope first.
        #[arg(long)]
        clear: bool,
    },

    /// Read session journals from the journal store.
    Journal {
        /// Session to print.
        session_id: Option<Uuid>,

        /// List stored sessions instead.
        #[arg(long, conflicts_with = "session_id")]
        list: bool,

        /// Only list sessions with at least one accepted change.
        #[arg(long, requires = "list")]
        with_changes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { file } => {
            let value = read_json(&file)?;
            match validate::validate(&value) {
                Ok(()) => println!("{}: valid", file.display()),
                Err(report) => {
                    for issue in &report.issues {
                        println!("{}: {issue}", file.display());
                    }
                    anyhow::bail!("{} issue(s) found", report.issues.len());
                }
            }
        }
        Command::Stats { file } => {
            let document = read_document(&file)?;
            print!("{}", DocumentStats::of(&document));
        }
        Command::Persist { file, scope, clear } => {
            let document = read_document(&file)?;

            let graph_config = load_graph_config(&cli.config);
            let graph = GraphClient::connect(&graph_config).await?.with_scope(&scope);

            if clear {
                let deleted = graph.clear_scope().await?;
                tracing::info!(scope = %scope, deleted, "Cleared scope");
            }

            let report = persist_document(&graph, &document).await?;
            println!(
                "Persisted {} nodes and {} relationships under scope {scope} ({} skipped)",
                report.nodes_created, report.relationships_created, report.relationships_skipped
            );
        }
        Command::Journal {
            session_id,
            list,
            with_changes,
        } => {
            let settings = kgrefine_core::config::load(&cli.config)?;
            let store = FileJournalStore::new(&settings.session.journal_dir)?;

            if list {
                let listing = store.list(&JournalQuery {
                    with_changes_only: with_changes,
                })?;
                for journal in &listing.journals {
                    println!(
                        "{}  {}  {} turns, {} accepted",
                        journal.id,
                        journal.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        journal.turns.len(),
                        journal.accepted_changes
                    );
                }
                for (path, reason) in &listing.skipped {
                    eprintln!("skipped {}: {reason}", path.display());
                }
            } else {
                let id = session_id
                    .ok_or_else(|| anyhow::anyhow!("Specify a session id or --list"))?;
                let journal = store.get(SessionId(id))?;
                println!("Session {}", journal.id);
                println!("Source: {}", journal.source_excerpt);
                println!();
                print!("{}", journal.transcript());
                println!();
                print!("{}", DocumentStats::of(&journal.document));
            }
        }
    }

    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn read_document(path: &Path) -> anyhow::Result<GraphDocument> {
    Ok(GraphDocument::from_value(read_json(path)?)?)
}

fn load_graph_config(file_prefix: &str) -> GraphConfig {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("KGREFINE")
                .separator("__")
                .try_parsing(true),
        )
        .build();

    match cfg {
        Ok(c) => GraphConfig {
            uri: c
                .get_string("neo4j.uri")
                .unwrap_or_else(|_| "bolt://localhost:7687".to_string()),
            user: c
                .get_string("neo4j.user")
                .unwrap_or_else(|_| "neo4j".to_string()),
            password: c
                .get_string("neo4j.password")
                .unwrap_or_else(|_| "kgrefine-dev".to_string()),
            ..Default::default()
        },
        Err(_) => GraphConfig::default(),
    }
}
