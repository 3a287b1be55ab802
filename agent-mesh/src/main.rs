use std::process::ExitCode;
use std::sync::Arc;

use agent_mesh::reply::{self, Reply, EXIT_FAILED};
use agent_mesh_core::gateway::BoxGateway;
use agent_mesh_core::ledger::Provenance;
use agent_mesh_core::memory::{MemoryRecord, Revision};
use agent_mesh_core::{Mesh, MeshConfig};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agent-mesh")]
#[command(about = "Shared memory, shadow staging and an audit ledger for agents working in Box folders")]
struct Cli {
    /// Box access token (falls back to BOX_ACCESS_TOKEN)
    #[arg(long, global = true, env = "BOX_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read or replace a folder's agent memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Append to or show a folder's reasoning ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Stage, inspect or commit shadow edits
    Shadow {
        #[command(subcommand)]
        action: ShadowAction,
    },

    /// Write task context for the next agent and audit the handoff
    Handoff {
        folder: String,
        /// JSON object to store
        task: String,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    Read {
        folder: String,
    },
    Write {
        folder: String,
        /// JSON object replacing the current memory
        data: String,

        /// Only write if the stored memory still has this revision
        #[arg(long, conflicts_with = "if_absent")]
        if_revision: Option<String>,

        /// Only write if no memory exists yet
        #[arg(long)]
        if_absent: bool,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    Log {
        folder: String,
        action: String,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        reasoning: Option<String>,
    },
    Show {
        folder: String,
    },
}

#[derive(Subcommand)]
enum ShadowAction {
    Create {
        folder: String,
        /// File id to stage; repeat for several. Stages every file when omitted.
        #[arg(long = "file")]
        files: Vec<String>,
    },
    Status {
        folder: String,
    },
    Commit {
        folder: String,
        /// Approve merging the staged files into the folder
        #[arg(long)]
        approve: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let reply = match run(cli).await {
        Ok(reply) => reply,
        Err(err) => {
            error!("{err:#}");
            Reply {
                status: EXIT_FAILED,
                body: json!({ "status": "failed", "error": format!("{err:#}") }),
            }
        }
    };
    match serde_json::to_string_pretty(&reply.body) {
        Ok(out) => println!("{out}"),
        Err(_) => println!("{}", reply.body),
    }
    ExitCode::from(reply.status)
}

fn load_config(token: Option<String>) -> Result<MeshConfig> {
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    if let Some(token) = token {
        vars.push(("BOX_ACCESS_TOKEN".to_string(), token));
    }
    Ok(MeshConfig::from_vars(vars)?)
}

fn parse_record(raw: &str) -> Result<MemoryRecord> {
    match serde_json::from_str::<Value>(raw).context("memory must be valid JSON")? {
        Value::Object(record) => Ok(record),
        _ => Err(anyhow!("memory must be a JSON object")),
    }
}

async fn run(cli: Cli) -> Result<Reply> {
    let config = load_config(cli.token)?;
    let gateway = Arc::new(BoxGateway::new(&config)?);
    let mesh = Mesh::new(gateway, &config);
    debug!(api_base = %config.api_base, "configured Box gateway");

    let reply = match cli.command {
        Commands::Memory { action } => match action {
            MemoryAction::Read { folder } => reply::memory_read(mesh.read_memory(&folder).await),
            MemoryAction::Write {
                folder,
                data,
                if_revision,
                if_absent,
            } => {
                let record = parse_record(&data)?;
                let written = if if_absent {
                    mesh.write_memory_if(&folder, &record, None).await
                } else if let Some(rev) = if_revision {
                    let rev = Revision::from(rev);
                    mesh.write_memory_if(&folder, &record, Some(&rev)).await
                } else {
                    mesh.write_memory(&folder, &record).await
                };
                reply::memory_write(written)
            }
        },
        Commands::Ledger { action } => match action {
            LedgerAction::Log {
                folder,
                action,
                prompt,
                model,
                reasoning,
            } => {
                let provenance = Provenance {
                    prompt,
                    model,
                    reasoning,
                };
                reply::logged(mesh.log_action(&folder, &action, provenance).await)
            }
            LedgerAction::Show { folder } => reply::history(mesh.history(&folder).await),
        },
        Commands::Shadow { action } => match action {
            ShadowAction::Create { folder, files } => {
                let selection = (!files.is_empty()).then_some(files.as_slice());
                reply::staged(mesh.stage(&folder, selection).await)
            }
            ShadowAction::Status { folder } => reply::shadow_state(mesh.shadow_state(&folder).await),
            ShadowAction::Commit { folder, approve } => {
                reply::committed(mesh.commit(&folder, approve).await)
            }
        },
        Commands::Handoff { folder, task } => {
            let record = parse_record(&task)?;
            reply::handed_off(mesh.hand_off(&folder, &record).await)
        }
    };
    Ok(reply)
}
