#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use hf_akashic::Akashic;
use hf_core::StreamId;
use hf_daemon::{build_app, AppState};
use hf_scheduler::Scheduler;
use hf_sinks::{ActivityLogSink, Sink};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hf-daemon", version, about = "HiveForge orchestration daemon")]
struct Args {
    /// Path to a TOML config file. Overridden by environment variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address override, e.g. "127.0.0.1:8080".
    #[arg(long)]
    bind: Option<String>,

    /// Vault root directory override.
    #[arg(long)]
    vault_path: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { EnvFilter::new("hf=debug,tower_http=debug") } else { EnvFilter::new("hf=info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = hf_config::load_config(args.config.as_deref()).context("load config")?;
    if let Some(bind) = args.bind {
        config.bind = Some(bind);
    }
    if let Some(vault_path) = args.vault_path {
        config.vault_path = Some(vault_path.to_string_lossy().into_owned());
    }

    let vault_path = config.vault_path.clone().unwrap_or_else(|| ".hiveforge/vault".to_string());
    let akashic = Arc::new(Akashic::new(vault_path.clone()));
    let scheduler = Arc::new(Scheduler::new(akashic.clone()));
    let bind = config.bind.clone().unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let activity_log_path = PathBuf::from(&vault_path).join("activity.log");
    tokio::spawn(tail_into_sinks(akashic, vec![Box::new(ActivityLogSink::new(activity_log_path))]));

    let state = Arc::new(AppState { scheduler, config });
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind).await.with_context(|| format!("bind {bind}"))?;
    info!(bind = %bind, vault = %vault_path, "hf-daemon listening");

    axum::serve(listener, app).await.context("serve")
}

/// Polls every stream in the Vault and feeds new events to each sink. Sinks
/// are idempotent, so re-polling the same tail on every tick is safe.
async fn tail_into_sinks(akashic: Arc<Akashic>, mut sinks: Vec<Box<dyn Sink>>) {
    let mut seen: HashSet<String> = HashSet::new();
    loop {
        match akashic.list_streams().await {
            Ok(streams) => {
                for stream in streams {
                    let Ok(stream_id) = StreamId::parse(stream.clone()) else { continue };
                    let Ok(events) = akashic.replay(&stream_id, None).await else { continue };
                    for event in events {
                        let id = event.event.id.to_string();
                        if !seen.insert(id) {
                            continue;
                        }
                        for sink in sinks.iter_mut() {
                            if let Err(e) = sink.apply(&event).await {
                                tracing::warn!(stream = %stream, error = %e, "sink apply failed");
                            }
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "listing streams for sink tail"),
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}
