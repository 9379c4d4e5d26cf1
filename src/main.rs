// src/main.rs
//! chain-sentinel entry point
use std::sync::Arc;

use anyhow::Result;
use chain_sentinel::alerting::{AlertPipeline, LoggingAlertSink};
use chain_sentinel::blockchain::{AptosRestClient, LedgerClient};
use chain_sentinel::cli::{Cli, Commands};
use chain_sentinel::compliance::{PolicyEngine, PolicyRecord};
use chain_sentinel::core::SentinelConfig;
use chain_sentinel::monitoring::{SentinelMetrics, TransactionMonitor, TransactionPayload};
use chain_sentinel::risk::{RiskScorer, TargetKind};
use clap::Parser;
use parking_lot::RwLock;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = match SentinelConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Commands::Monitor { addresses, metrics } => run_monitor(config, addresses, metrics).await,
        Commands::Check { sender, receiver, value, gas_used, function } => {
            let engine = PolicyEngine::from_config(&config.policies)?;
            let payload = function.map(|f| TransactionPayload::with_function(f));
            let compliance =
                engine.check_transaction(&sender, receiver.as_deref(), value, gas_used, payload.as_ref());
            let report = RiskScorer::new().create_comprehensive_report(
                sender,
                TargetKind::Address,
                Some(compliance),
                None,
                None,
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Policies { stats } => {
            let engine = PolicyEngine::from_config(&config.policies)?;
            if stats {
                println!("{}", serde_json::to_string_pretty(&engine.get_policy_stats())?);
            } else {
                let records: Vec<PolicyRecord> =
                    engine.list_policies().iter().cloned().map(PolicyRecord::from).collect();
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
            Ok(())
        }
    }
}

async fn run_monitor(mut config: SentinelConfig, addresses: Vec<String>, dump_metrics: bool) -> Result<()> {
    info!("Starting chain-sentinel v{}", env!("CARGO_PKG_VERSION"));
    config.monitor.monitored_addresses.extend(addresses);

    let metrics = Arc::new(SentinelMetrics::new()?);
    let client: Arc<dyn LedgerClient> = Arc::new(AptosRestClient::new(&config.ledger)?);
    let engine = Arc::new(RwLock::new(PolicyEngine::from_config(&config.policies)?));

    let monitor = TransactionMonitor::with_metrics(&config.monitor, Some(client), Arc::clone(&metrics));
    let pipeline = Arc::new(
        AlertPipeline::new(engine, &config.alerts)
            .with_sink(Arc::new(LoggingAlertSink))
            .with_metrics(Arc::clone(&metrics)),
    );
    pipeline.attach(&monitor);

    monitor.start().await?;
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    monitor.stop().await;

    if dump_metrics {
        print!("{}", metrics.export_metrics()?);
    }
    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,reqwest=info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
