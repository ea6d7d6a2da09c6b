mod output;
mod telemetry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use glanceship_core::config::{Config, OverlapPolicy};
use glanceship_ship::points::PointBuilder;
use glanceship_ship::scheduler::{Scheduler, SchedulerConfig, run_cycle};
use glanceship_ship::sink::{InfluxConfig, InfluxSink, WriteCompression};
use glanceship_ship::source::{GlancesClient, MetricSource};

use crate::output::{
    print_points_json, print_points_line_protocol, print_report_human, print_report_json,
};
use crate::telemetry::{LogFormat, init_cli_tracing, init_run_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "glanceship")]
#[command(about = "Ship Glances host telemetry into InfluxDB")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Poll Glances and write to InfluxDB until interrupted")]
    Run {
        #[arg(long)]
        glances_url: Option<String>,
        #[arg(long, help = "Polling interval in seconds")]
        interval: Option<u64>,
        #[arg(long, help = "serialize or overlap")]
        overlap: Option<OverlapPolicy>,
        #[arg(long, help = "Host tag used when Glances reports no hostname")]
        host: Option<String>,
    },
    #[command(about = "Run a single cycle and exit")]
    Once {
        #[arg(long, help = "Print the batch instead of writing it")]
        dry_run: bool,
        #[arg(long)]
        glances_url: Option<String>,
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            glances_url,
            interval,
            overlap,
            host,
        } => {
            let mut cfg = Config::load().context("load configuration")?;
            if let Some(v) = glances_url {
                cfg.glances_url = Some(v);
            }
            if let Some(v) = interval {
                anyhow::ensure!(v > 0, "--interval must be at least one second");
                cfg.interval = Duration::from_secs(v);
            }
            if let Some(v) = overlap {
                cfg.overlap = v;
            }
            if let Some(v) = host {
                cfg.host = Some(v);
            }
            run_bridge(cfg, cli.json).await
        }
        Commands::Once {
            dry_run,
            glances_url,
            host,
        } => {
            init_cli_tracing();
            let mut cfg = Config::load().context("load configuration")?;
            if let Some(v) = glances_url {
                cfg.glances_url = Some(v);
            }
            if let Some(v) = host {
                cfg.host = Some(v);
            }
            run_once(cfg, dry_run, cli.json).await
        }
    }
}

async fn run_bridge(cfg: Config, json: bool) -> anyhow::Result<()> {
    cfg.validate()?;
    init_run_tracing(LogFormat::resolve(json));

    let local = local_hostname();
    let source = GlancesClient::new(cfg.glances_url()?, cfg.fetch_timeout)?;
    let influx = influx_config(&cfg, &local)?;
    let builder = PointBuilder::new(cfg.host.clone().unwrap_or_else(|| local.clone()));

    eprintln!("glanceship run");
    eprintln!("  glances: {}", source.base_url());
    eprintln!("  influx: {} org={} bucket={}", influx.url, influx.org, influx.bucket);
    eprintln!("  interval: {}s", cfg.interval.as_secs());
    eprintln!("  overlap: {}", cfg.overlap);

    let sink = InfluxSink::new(influx)?;
    let scheduler = Scheduler::new(
        Arc::new(source),
        Arc::new(sink),
        builder,
        SchedulerConfig {
            interval: cfg.interval,
            overlap: cfg.overlap,
        },
    );
    let handle = scheduler.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("wait for ctrl-c")?;
    tracing::info!("received ctrl-c, shutting down");

    handle.shutdown().await;
    shutdown_tracing();
    Ok(())
}

async fn run_once(cfg: Config, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let local = local_hostname();
    let source = GlancesClient::new(cfg.glances_url()?, cfg.fetch_timeout)?;
    let builder = PointBuilder::new(cfg.host.clone().unwrap_or_else(|| local.clone()));

    if dry_run {
        let snapshot = source.fetch_all().await?;
        let points = builder.build(&snapshot, Utc::now())?;
        if json {
            print_points_json(&points)?;
        } else {
            print_points_line_protocol(&points, &default_tags(&local))?;
        }
        return Ok(());
    }

    cfg.validate()?;
    let sink = InfluxSink::new(influx_config(&cfg, &local)?)?;
    let report = run_cycle(&source, &builder, &sink).await?;
    if json {
        print_report_json(&report)?;
    } else {
        print_report_human(&report);
    }
    Ok(())
}

fn influx_config(cfg: &Config, local: &str) -> anyhow::Result<InfluxConfig> {
    let target = cfg.influx_target()?;
    Ok(InfluxConfig {
        url: target.url,
        token: target.token,
        org: target.org,
        bucket: target.bucket,
        compression: WriteCompression::parse(&cfg.influx_compression)?,
        timeout: cfg.write_timeout,
        default_tags: default_tags(local),
    })
}

/// Every point also records which machine ran the bridge.
fn default_tags(local: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("location".to_string(), local.to_string())])
}

fn local_hostname() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}
