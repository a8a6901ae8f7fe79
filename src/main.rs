//! # Contract Harness CLI (`ctr`)
//!
//! ## Usage
//!
//! ```bash
//! ctr --config ./config/ctr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctr init` | Create the SQLite database and run schema migrations |
//! | `ctr add <file>` | Register, extract and chunk one contract document |
//! | `ctr process <contract>` | Run references, overrides, embeddings and validation |
//! | `ctr validate <contract>` | Print the Markdown validation report |
//! | `ctr clause <contract> <n>` | Show the effective text of a clause |
//! | `ctr graph <contract>` | Export the clause citation graph as JSON |
//! | `ctr overrides <contract>` | List override edges and contradictions |
//! | `ctr delete <document>` | Delete a document and everything derived from it |
//! | `ctr health` | Check the OCR service |
//! | `ctr completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! ctr init
//! ctr add docs/AGR1_Agreement.pdf --contract c-17 --group agreement
//! ctr add docs/ADD1_Addendum.docx --contract c-17 --group addendum --date 2024-03-01
//! ctr process c-17 --embeddings
//! ctr clause c-17 9.1
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` for detail.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use contract_harness::commands::{self, AddOptions};
use contract_harness::config::{self, DEFAULT_CONFIG_PATH};
use contract_harness::migrate;
use contract_harness_core::models::DocumentGroup;

/// Contract Harness: ingest construction-contract documents into clauses,
/// cross-references and precedence edges, and validate the result.
#[derive(Parser)]
#[command(name = "ctr", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Register a document, extract its text and chunk it into clauses.
    Add {
        /// The document file (txt, md, pdf, docx, xlsx).
        file: PathBuf,

        /// Contract the document belongs to.
        #[arg(long)]
        contract: String,

        /// Document group: agreement, acceptance_letter, conditions,
        /// addendum, boq or schedule.
        #[arg(long)]
        group: DocumentGroup,

        /// Display name. Defaults to the file stem.
        #[arg(long)]
        name: Option<String>,

        /// Effective date (YYYY-MM-DD); orders addenda.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Id of a document this one replaces.
        #[arg(long)]
        supersedes: Option<String>,

        /// `particular` or `general` for conditions documents.
        #[arg(long)]
        conditions_kind: Option<String>,

        /// Send the file to the OCR service instead of reading it locally.
        #[arg(long)]
        ocr: bool,
    },

    /// Run the contract-wide pipeline stages.
    Process {
        contract: String,

        #[arg(long)]
        no_references: bool,

        #[arg(long)]
        no_overrides: bool,

        /// Generate embeddings for new or changed chunks.
        #[arg(long)]
        embeddings: bool,

        #[arg(long)]
        no_validation: bool,
    },

    /// Run the integrity checks and print a Markdown report.
    Validate {
        contract: String,

        /// Write the report to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show the effective content of a clause and its override chain.
    Clause { contract: String, clause: String },

    /// Export the clause citation graph as JSON.
    Graph {
        contract: String,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List override edges between the documents of a contract.
    Overrides {
        contract: String,

        /// Print JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Delete a document with its chunks, references and overrides.
    Delete { document: String },

    /// Check that the configured OCR service is up.
    Health,

    /// Print shell completions.
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "ctr", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            file,
            contract,
            group,
            name,
            date,
            supersedes,
            conditions_kind,
            ocr,
        } => {
            let options = AddOptions {
                file,
                contract_id: contract,
                group,
                name,
                effective_date: date,
                supersedes,
                conditions_kind,
                ocr,
            };
            commands::run_add(&cfg, &options).await?;
        }
        Commands::Process {
            contract,
            no_references,
            no_overrides,
            embeddings,
            no_validation,
        } => {
            let toggles = commands::toggles_from_flags(
                &cfg,
                no_references,
                no_overrides,
                embeddings,
                no_validation,
            );
            commands::run_process(&cfg, &contract, toggles).await?;
        }
        Commands::Validate { contract, output } => {
            commands::run_validate(&cfg, &contract, output.as_deref()).await?;
        }
        Commands::Clause { contract, clause } => {
            commands::run_clause(&cfg, &contract, &clause).await?;
        }
        Commands::Graph { contract, output } => {
            commands::run_graph(&cfg, &contract, output.as_deref()).await?;
        }
        Commands::Overrides { contract, json } => {
            commands::run_overrides(&cfg, &contract, json).await?;
        }
        Commands::Delete { document } => {
            commands::run_delete(&cfg, &document).await?;
        }
        Commands::Health => {
            commands::run_health(&cfg).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
