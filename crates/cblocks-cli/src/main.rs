//! Command-line interface for CBlocks.

mod config;
mod wire;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;

use cblocks_core::config::env_vars;
use cblocks_core::mapping::MappingStrategy;
use cblocks_core::resource::{CBlock, InstanceId, ObjectId, ResourceId};
use cblocks_mappings::action::ACTION_ERROR_STATUS;
use cblocks_mappings::{ActionBridge, MappingsUseCase};

use crate::config::CBlocksConfig;
use crate::wire::{Stores, Writer};

/// CBlocks - device registry, value mappings and resource writes.
#[derive(Parser, Debug)]
#[command(name = "cblocks")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered CBlocks.
    List,
    /// Upsert CBlock definitions from a JSON file (one object or an array).
    Register { file: PathBuf },
    /// Change the label of an object instance.
    Label {
        object_id: ObjectId,
        instance_id: InstanceId,
        label: String,
    },
    /// Write a value to a device resource and wait for the confirmation.
    Write {
        object_id: ObjectId,
        instance_id: InstanceId,
        resource_id: ResourceId,
        /// JSON value; bare words are sent as strings.
        value: String,
    },
    /// Manage mapping definitions.
    Mappings {
        kind: MappingKind,
        #[command(subcommand)]
        action: MappingCommand,
    },
    /// Apply a mapping to a raw value and record the result.
    Apply {
        kind: MappingKind,
        mapping_id: String,
        value: String,
    },
    /// Show the output history of a mapping, newest first.
    Records {
        kind: MappingKind,
        mapping_id: String,
        /// Only records whose derived value equals this JSON value.
        #[arg(long)]
        to: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Trigger a mapping the way an automation action does.
    Action {
        kind: MappingKind,
        mapping_id: String,
        value: String,
    },
}

#[derive(Subcommand, Debug)]
enum MappingCommand {
    List,
    Get {
        mapping_id: String,
    },
    /// Create a mapping from a JSON payload, or `@path` to read a file.
    Create {
        payload: String,
    },
    /// Replace a mapping in full.
    Put {
        mapping_id: String,
        payload: String,
    },
    Delete {
        mapping_id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MappingKind {
    Range,
    Category,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = CBlocksConfig::load(&args.config)?;
    let stores = Stores::open(&config.storage)?;

    match args.command {
        Command::List => print_json(&stores.registry.get_objects()?),
        Command::Register { file } => register(&stores, &file),
        Command::Label {
            object_id,
            instance_id,
            label,
        } => {
            let cblock = stores
                .registry
                .set_label(object_id, instance_id, &label)
                .map_err(|e| failure(e.into()))?;
            print_json(&cblock)
        }
        Command::Write {
            object_id,
            instance_id,
            resource_id,
            value,
        } => {
            let writer = Writer::connect(&config, stores.registry.clone());
            let confirmed = writer
                .writes()
                .write(
                    writer.client_id(),
                    object_id,
                    instance_id,
                    resource_id,
                    parse_value(&value),
                )
                .await
                .map_err(failure)?;
            print_json(&confirmed)
        }
        Command::Mappings { kind, action } => match kind {
            MappingKind::Range => run_mappings(&stores.range, action).await,
            MappingKind::Category => run_mappings(&stores.category, action).await,
        },
        Command::Apply {
            kind,
            mapping_id,
            value,
        } => {
            let raw = parse_value(&value);
            let derived = match kind {
                MappingKind::Range => stores.range.apply_by_id(&mapping_id, raw, None).await,
                MappingKind::Category => stores.category.apply_by_id(&mapping_id, raw, None).await,
            }
            .map_err(failure)?;
            print_json(&derived)
        }
        Command::Records {
            kind,
            mapping_id,
            to,
            limit,
        } => {
            let to = to.as_deref().map(parse_value);
            match kind {
                MappingKind::Range => records(&stores.range, &mapping_id, to, limit).await,
                MappingKind::Category => records(&stores.category, &mapping_id, to, limit).await,
            }
        }
        Command::Action {
            kind,
            mapping_id,
            value,
        } => match kind {
            MappingKind::Range => action(stores.range_actions(), &mapping_id, &value).await,
            MappingKind::Category => action(stores.category_actions(), &mapping_id, &value).await,
        },
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "cblocks=debug" } else { "cblocks=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries command output.
    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn register(stores: &Stores, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let cblocks: Vec<CBlock> = match serde_json::from_str::<Value>(&content)? {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?,
        single => vec![serde_json::from_value(single)?],
    };

    for cblock in &cblocks {
        stores.registry.update_object(cblock)?;
    }
    print_json(&cblocks)
}

async fn run_mappings<S: MappingStrategy>(
    mappings: &MappingsUseCase<S>,
    command: MappingCommand,
) -> Result<()> {
    match command {
        MappingCommand::List => print_json(&mappings.get_mappings().await.map_err(failure)?),
        MappingCommand::Get { mapping_id } => {
            print_json(&mappings.get_mapping(&mapping_id).await.map_err(failure)?)
        }
        MappingCommand::Create { payload } => {
            let payload = read_payload(&payload)?;
            print_json(&mappings.create_mapping_json(payload).await.map_err(failure)?)
        }
        MappingCommand::Put {
            mapping_id,
            payload,
        } => {
            let payload = read_payload(&payload)?;
            let mapping = mappings
                .put_mapping_json(&mapping_id, payload)
                .await
                .map_err(failure)?;
            print_json(&mapping)
        }
        MappingCommand::Delete { mapping_id } => {
            mappings.delete_mapping(&mapping_id).await.map_err(failure)?;
            print_json(&serde_json::json!({ "kind": mappings.kind(), "deleted": mapping_id }))
        }
    }
}

async fn records<S: MappingStrategy>(
    mappings: &MappingsUseCase<S>,
    mapping_id: &str,
    to: Option<Value>,
    limit: Option<usize>,
) -> Result<()> {
    let records = match to {
        Some(to) => mappings.get_records_by_to(mapping_id, &to, limit).await,
        None => mappings.get_records(mapping_id, limit).await,
    }
    .map_err(failure)?;
    print_json(&records)
}

async fn action<S: MappingStrategy>(
    bridge: ActionBridge<S>,
    mapping_id: &str,
    value: &str,
) -> Result<()> {
    let response = bridge
        .post_action(mapping_id, parse_value(value))
        .await
        .map_err(|e| anyhow!("[{}] {}", ACTION_ERROR_STATUS, e))?;
    print_json(&response)
}

/// Attach the status code to a domain error for reporting.
fn failure(error: cblocks_core::Error) -> anyhow::Error {
    anyhow!("[{}] {}", error.status_code(), error)
}

/// Parse a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parse a JSON payload given inline or as `@path`.
fn read_payload(raw: &str) -> Result<Value> {
    let content = match raw.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?
        }
        None => raw.to_string(),
    };
    serde_json::from_str(&content).context("Payload is not valid JSON")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
