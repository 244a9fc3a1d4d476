#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hf_akashic::Akashic;
use hf_core::StreamId;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Operator tool for Vault inspection and driving the REST surface. Distinct
/// from the product-facing CLI front-end named out of scope elsewhere: this
/// one is for the person running the daemon, not the person using it.
#[derive(Parser, Debug)]
#[command(name = "hf-cli", version, about = "HiveForge operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect the Akashic Record directly on disk.
    #[command(subcommand)]
    Akashic(AkashicCommands),

    /// Drive Hives through the REST surface.
    #[command(subcommand)]
    Hive(HiveCommands),
}

#[derive(Subcommand, Debug)]
enum AkashicCommands {
    /// Verify a stream's hash chain.
    Verify {
        /// Stream id (Run id, Colony id, or Hive id).
        stream: String,
        /// Vault root directory.
        #[arg(long, default_value = ".hiveforge/vault")]
        vault_path: PathBuf,
    },
    /// Print a stream's events as JSONL.
    Replay {
        stream: String,
        #[arg(long, default_value = ".hiveforge/vault")]
        vault_path: PathBuf,
    },
    /// List streams that have at least one event.
    Streams {
        #[arg(long, default_value = ".hiveforge/vault")]
        vault_path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum HiveCommands {
    /// List Hives known to a running daemon.
    List {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        base_url: String,
    },
    /// Create a Hive.
    Create {
        name: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        base_url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { EnvFilter::new("hf=debug") } else { EnvFilter::new("hf=info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Akashic(cmd) => run_akashic(cmd).await,
        Commands::Hive(cmd) => run_hive(cmd).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_akashic(cmd: AkashicCommands) -> Result<()> {
    match cmd {
        AkashicCommands::Verify { stream, vault_path } => {
            let akashic = Akashic::new(vault_path);
            let stream_id = StreamId::parse(stream).context("invalid stream id")?;
            let report = akashic.verify_chain(&stream_id).await?;
            if report.ok {
                println!("ok");
            } else {
                println!("FAILED at index {:?}", report.first_failure_index);
                std::process::exit(1);
            }
            Ok(())
        }
        AkashicCommands::Replay { stream, vault_path } => {
            let akashic = Akashic::new(vault_path);
            let stream_id = StreamId::parse(stream).context("invalid stream id")?;
            for event in akashic.replay(&stream_id, None).await? {
                println!("{}", event.to_jsonl()?);
            }
            Ok(())
        }
        AkashicCommands::Streams { vault_path } => {
            let akashic = Akashic::new(vault_path);
            for stream in akashic.list_streams().await? {
                println!("{stream}");
            }
            Ok(())
        }
    }
}

async fn run_hive(cmd: HiveCommands) -> Result<()> {
    match cmd {
        HiveCommands::List { base_url } => {
            let body = reqwest::get(format!("{base_url}/hives")).await?.error_for_status()?.text().await?;
            println!("{body}");
            Ok(())
        }
        HiveCommands::Create { name, base_url } => {
            let client = reqwest::Client::new();
            let body = client
                .post(format!("{base_url}/hives"))
                .json(&serde_json::json!({"name": name}))
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            println!("{body}");
            Ok(())
        }
    }
}
