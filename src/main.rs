// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cacao_rs::automation::condition::evaluate_str;
use cacao_rs::automation::variables::VariableContext;
use cacao_rs::cacao::ingest::Deserializer;
use cacao_rs::cacao::loader::DocumentLoader;
use cacao_rs::cacao::schema::{validate, Level};
use cacao_rs::cacao::store::FileStore;
use cacao_rs::config::Settings;
use cacao_rs::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a playbook document and print every finding
    Validate {
        /// Path to the playbook (.json, .yaml or .yml)
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Flatten a playbook into the store
    Import {
        /// Path to the playbook (.json, .yaml or .yml)
        #[arg(short, long)]
        file: PathBuf,

        /// Name to store the playbook under (defaults to the document's name)
        #[arg(short, long)]
        name: Option<String>,

        /// Stage the graph and print it without saving
        #[arg(long)]
        dry_run: bool,

        /// Snapshot file of the store
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Evaluate a condition expression
    Eval {
        /// Expression, e.g. "[$$severity$$ = 'high']"
        #[arg(short, long)]
        condition: String,

        /// Variable definitions as inline JSON or a path to a JSON/YAML file
        #[arg(short, long)]
        variables: Option<String>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Snapshot file of the store
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::from_env().context("Failed to read settings")?;

    match args.command {
        Commands::Validate { file } => {
            let document = DocumentLoader::new()
                .load(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let report = validate(&document);
            for finding in &report.errors {
                println!("{}", finding);
            }
            println!(
                "{}: {} error(s), {} warning(s), {} info",
                file.display(),
                report.count(Level::Error),
                report.count(Level::Warning),
                report.count(Level::Info)
            );
            if !report.valid {
                bail!("{} is not a valid playbook", file.display());
            }
        }
        Commands::Import {
            file,
            name,
            dry_run,
            store,
        } => {
            let document = DocumentLoader::new()
                .load(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let name = match name.or_else(|| document_name(&document)) {
                Some(name) => name,
                None => bail!("{} has no name; pass --name", file.display()),
            };

            let mut deserializer = Deserializer::new(document, name.clone());
            for warning in deserializer.validate().at_level(Level::Warning) {
                log::warn!("{}", warning);
            }
            deserializer.deserialize()?;

            if dry_run {
                let staged = serde_json::json!({
                    "playbook": deserializer.playbook(),
                    "objects": deserializer.records(),
                    "relations": deserializer.relations(),
                });
                println!("{}", serde_json::to_string_pretty(&staged)?);
                return Ok(());
            }

            let store = FileStore::new(store.unwrap_or(settings.store_path));
            deserializer
                .save_with_deadline(&store, settings.save_timeout)
                .await
                .with_context(|| format!("Failed to save '{}'", name))?;
            println!(
                "Imported '{}': {} objects, {} relations -> {}",
                name,
                deserializer.records().len(),
                deserializer.relations().len(),
                store.path().display()
            );
        }
        Commands::Eval {
            condition,
            variables,
        } => {
            let context = match variables {
                Some(source) => VariableContext::from_json(&read_variables(&source)?)?,
                None => VariableContext::empty(),
            };
            let result = evaluate_str(&condition, &context)?;
            println!("{}", result);
        }
        Commands::Serve { port, store } => {
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .finish();
            if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
                log::warn!("Request tracing disabled: {}", e);
            }

            let store = FileStore::new(store.unwrap_or(settings.store_path));
            log::info!("Using store at {}", store.path().display());
            let state = AppState::new(Arc::new(store), settings.save_timeout);
            server::serve(port.unwrap_or(settings.server_port), state).await?;
        }
    }

    Ok(())
}

fn document_name(document: &Value) -> Option<String> {
    document.get("name").and_then(Value::as_str).map(str::to_string)
}

/// Inline JSON when it parses as such, otherwise a file path
fn read_variables(source: &str) -> anyhow::Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(source) {
        return Ok(value);
    }
    let path = Path::new(source);
    DocumentLoader::new()
        .load(path)
        .with_context(|| format!("Failed to read variables from {}", path.display()))
}
