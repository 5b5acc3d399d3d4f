mod config;
mod metrics;
mod scheduler;

use config::{ConfigManager, TargetConfig};
use metrics::{add_dropped, add_errors, initialize_metrics, observe_latency};
use scheduler::Scheduler;

use std::sync::Arc;

use tcp_probe::{ProbeReport, ping, probe};
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    // Load config first to get log level
    let config_mgr = Arc::new(ConfigManager::start().await?);
    let log_level = config_mgr.config.read().await.get_tracing_level()?;

    println!("Starting tcp_probe monitor");

    // Initialize metrics based on configuration
    let enable_latency_history = config_mgr.config.read().await.enable_latency_history;
    initialize_metrics(enable_latency_history);

    if enable_latency_history {
        println!("Latency history tracking enabled");
    } else {
        println!("Latency history tracking disabled - showing current latency only");
    }

    // Init tracing with configured log level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                format!("tcp_probe={}", log_level.as_str().to_lowercase()).parse()?,
            ),
        )
        .init();

    // Start metrics endpoint
    let metrics_addr = ([0, 0, 0, 0], 9100).into();
    tokio::spawn(metrics::serve_metrics(metrics_addr));

    let probe_interval_ms = config_mgr.config.read().await.probe_interval_ms;
    let scheduler = Scheduler::new(probe_interval_ms)?;

    scheduler
        .run(move || {
            let config_mgr = config_mgr.clone();
            async move {
                let (targets, default_timeout_ms) = {
                    let config = config_mgr.config.read().await;
                    (config.targets.clone(), config.default_timeout_ms)
                };
                for target in targets {
                    tokio::spawn(run_target(target, default_timeout_ms));
                }
            }
        })
        .await?;

    Ok(())
}

/// Run one target once and feed its report into logs and metrics.
async fn run_target(target: TargetConfig, default_timeout_ms: u64) {
    let kind = target.kind.as_str();

    let options = match target.to_options(default_timeout_ms) {
        Ok(options) => options,
        Err(e) => {
            error!("{} {} skipped: {:?}", kind, target.name, e);
            return;
        }
    };

    let outcome = match target.kind {
        config::ProbeKind::Probe => probe(options).await,
        config::ProbeKind::Ping => ping(options).await,
    };

    match outcome {
        Ok(report) => record(&target.name, kind, &report),
        Err(e) => error!("{} {} rejected: {:?}", kind, target.name, e),
    }
}

fn record(name: &str, kind: &str, report: &ProbeReport) {
    match report.avg {
        Some(avg) => {
            let avg_ms = avg.as_secs_f64() * 1000.0;
            info!(
                "{} {} avg {:.2}ms ({}/{} connected)",
                kind,
                name,
                avg_ms,
                report.attempts - report.dropped,
                report.attempts
            );
            observe_latency(name, kind, avg_ms);
        }
        None => {
            error!("{} {} dropped all {} attempts", kind, name, report.attempts);
        }
    }

    add_dropped(name, kind, report.dropped as u64);
    if let Some(errors) = report.errors {
        add_errors(name, kind, errors as u64);
    }
}
