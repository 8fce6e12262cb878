//! Command-line entry point: `suitelog harvest` publishes the newest
//! completed run's pod logs to the bus, `suitelog notify` consumes them into
//! Slack run threads.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use suitelog_bus::{BusClient, BusConfig};
use suitelog_harvest::{
    run_harvest, run_notify_loop, run_notify_once, HarvestConfig, NotifyLoopConfig,
};
use suitelog_kube::{KubeClient, KubeConfig};
use suitelog_slack::{NotifierConfig, SlackClient, SlackConfig, ThreadNotifier};
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "suitelog",
    about = "Harvests test-suite pod logs and files them into per-run Slack threads",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish the newest completed suite run's pod logs to the bus.
    Harvest(HarvestArgs),
    /// Consume published logs and file them into Slack run threads.
    Notify(NotifyArgs),
}

#[derive(Args)]
struct HarvestArgs {
    /// Kubernetes API server base URL; falls back to in-cluster config.
    #[arg(long, env = "KUBE_API_BASE")]
    kube_api_base: Option<String>,
    #[arg(long, env = "KUBE_TOKEN", hide_env_values = true)]
    kube_token: Option<String>,
    /// File containing the bearer token, e.g. a mounted service-account token.
    #[arg(long, env = "KUBE_TOKEN_FILE")]
    kube_token_file: Option<PathBuf>,
    /// PEM bundle for the API server certificate authority.
    #[arg(long, env = "KUBE_CA_FILE")]
    kube_ca_file: Option<PathBuf>,
    #[arg(long, env = "APP_PROJECT_ID")]
    project_id: String,
    #[arg(long, env = "APP_TOPIC_ID")]
    topic_id: String,
    #[arg(long, env = "BUS_TOKEN", hide_env_values = true)]
    bus_token: String,
    #[arg(long, env = "BUS_API_BASE", default_value = "https://pubsub.googleapis.com")]
    bus_api_base: String,
    /// Container names treated as infrastructure sidecars, repeatable.
    #[arg(long = "infra-container", default_values_t = vec!["istio-proxy".to_string()])]
    infra_containers: Vec<String>,
    #[arg(long, default_value_t = 4)]
    max_concurrency: usize,
    #[arg(long, default_value_t = 30_000)]
    request_timeout_ms: u64,
}

#[derive(Args)]
struct NotifyArgs {
    #[arg(long, env = "APP_PROJECT_ID")]
    project_id: String,
    #[arg(long, env = "APP_SUBSCRIPTION_ID")]
    subscription_id: String,
    #[arg(long, env = "BUS_TOKEN", hide_env_values = true)]
    bus_token: String,
    #[arg(long, env = "BUS_API_BASE", default_value = "https://pubsub.googleapis.com")]
    bus_api_base: String,
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true)]
    slack_token: String,
    #[arg(long, env = "SLACK_CHANNEL")]
    slack_channel: String,
    #[arg(long, env = "SLACK_API_BASE", default_value = "https://slack.com/api")]
    slack_api_base: String,
    /// How many recent channel messages to scan for an existing run anchor.
    #[arg(long, default_value_t = 100)]
    history_limit: usize,
    /// Pause between posting a parent and attaching its upload, giving the
    /// chat backend time to index the thread.
    #[arg(long, default_value_t = 2_000)]
    settle_delay_ms: u64,
    #[arg(long, default_value_t = 5_000)]
    poll_interval_ms: u64,
    #[arg(long, default_value_t = 10)]
    max_messages: usize,
    /// Process a single pull batch and exit instead of polling.
    #[arg(long)]
    once: bool,
    #[arg(long, default_value_t = 30_000)]
    request_timeout_ms: u64,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("SUITELOG_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Harvest(args) => run_harvest_command(args).await,
        Command::Notify(args) => run_notify_command(args).await,
    }
}

async fn run_harvest_command(args: HarvestArgs) -> Result<()> {
    let kube_config = match args.kube_api_base {
        Some(api_base) => {
            let bearer_token = match (args.kube_token, &args.kube_token_file) {
                (Some(token), _) => token,
                (None, Some(path)) => std::fs::read_to_string(path)
                    .with_context(|| format!("while reading kube token file {}", path.display()))?
                    .trim()
                    .to_string(),
                (None, None) => {
                    bail!("--kube-token or --kube-token-file is required with --kube-api-base")
                }
            };
            let ca_cert_pem = match &args.kube_ca_file {
                Some(path) => Some(std::fs::read(path).with_context(|| {
                    format!("while reading kube CA file {}", path.display())
                })?),
                None => None,
            };
            KubeConfig {
                api_base,
                bearer_token,
                ca_cert_pem,
                request_timeout_ms: args.request_timeout_ms,
            }
        }
        None => KubeConfig::in_cluster()
            .context("no --kube-api-base given and in-cluster configuration unavailable")?,
    };

    let kube = KubeClient::new(kube_config)?;
    let bus = BusClient::new(BusConfig {
        api_base: args.bus_api_base,
        project_id: args.project_id,
        access_token: args.bus_token,
        request_timeout_ms: args.request_timeout_ms,
    })?;
    let config = HarvestConfig {
        infra_containers: args.infra_containers,
        max_concurrency: args.max_concurrency,
    };

    let report = run_harvest(&kube, &bus, &args.topic_id, &config).await?;
    if !report.all_published() {
        bail!(
            "{} of {} pods failed for run {}",
            report.failures.len(),
            report.published + report.failures.len(),
            report.run_name
        );
    }
    tracing::info!(run = %report.run_name, published = report.published, "harvest complete");
    Ok(())
}

async fn run_notify_command(args: NotifyArgs) -> Result<()> {
    let bus = BusClient::new(BusConfig {
        api_base: args.bus_api_base,
        project_id: args.project_id,
        access_token: args.bus_token,
        request_timeout_ms: args.request_timeout_ms,
    })?;
    let slack = SlackClient::new(SlackConfig {
        api_base: args.slack_api_base,
        bot_token: args.slack_token,
        request_timeout_ms: args.request_timeout_ms,
    })?;
    let notifier = ThreadNotifier::new(
        slack,
        NotifierConfig {
            channel_id: args.slack_channel,
            history_limit: args.history_limit,
            settle_delay: Duration::from_millis(args.settle_delay_ms),
        },
    );

    if args.once {
        let report =
            run_notify_once(&bus, &args.subscription_id, &notifier, args.max_messages).await?;
        if report.failed > 0 {
            bail!(
                "{} of {} messages failed to deliver",
                report.failed,
                report.delivered
            );
        }
        tracing::info!(
            delivered = report.delivered,
            notified = report.notified,
            "notify complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let config = NotifyLoopConfig {
        subscription_id: args.subscription_id,
        max_messages: args.max_messages,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
    };
    run_notify_loop(&bus, &notifier, &config, shutdown_rx).await
}
