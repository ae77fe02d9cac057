use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tag_sync::{
    audit::{AuditSink, HttpAuditSink, NoopAuditSink},
    config::{SyncConfig, load_config_path},
    directory::{EventHistory, GraphQlDirectory},
    logging::init_logging,
    providers::build_provider,
    query::build_query,
    sync::Syncer,
};

#[derive(Parser)]
#[command(version, about = "Entity Tag Sync CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run one sync cycle.
    Run {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        use_last_update: bool,
    },
    /// Check a config file and print each mapping's entity query.
    Validate {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },
}

async fn run(config: SyncConfig, dry_run: bool, use_last_update: bool) -> Result<ExitCode> {
    let provider = build_provider(&config.provider).context("failed to create provider")?;
    let directory =
        GraphQlDirectory::new(&config.directory).context("failed to create directory client")?;

    let audit: Box<dyn AuditSink> = if config.events.enabled {
        Box::new(HttpAuditSink::new(&config.events).context("failed to set up events")?)
    } else {
        Box::new(NoopAuditSink)
    };
    let history = EventHistory::new(&directory, config.events.account_id);

    let mut syncer = Syncer::new(provider.as_ref(), &directory, audit.as_ref(), &config.mappings)
        .with_event_type(config.events.event_type.clone());
    if config.events.enabled {
        syncer = syncer.with_audit_trail(&history, config.events.lookback_days);
    }

    let options = config.sync.options(dry_run, use_last_update);
    let report = syncer.run_cycle(&options).await;
    print!("{report}");

    Ok(if report.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Run {
            config,
            dry_run,
            use_last_update,
        } => {
            let cfg = load_config_path(&config)?;
            init_logging(&cfg.log).map_err(|e| anyhow!(e))?;
            run(cfg, dry_run, use_last_update).await
        }
        Cmd::Validate { config } => {
            let cfg = load_config_path(&config)?;
            for (i, m) in cfg.mappings.iter().enumerate() {
                println!(
                    "[{i}] {} -> {}",
                    m.external_query.record_type,
                    build_query(&m.entity_query)
                );
            }
            println!("config ok: {} mapping(s)", cfg.mappings.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}
