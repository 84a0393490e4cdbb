mod config;
mod sandbox;
mod scenario;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::sandbox::PlatformClient;
use crate::scenario::naming::ResourceNames;
use crate::scenario::poller::{PollPolicy, TransientPolicy};
use crate::scenario::{Outcome, RunReport, Scenario, ScenarioConfig};

#[derive(Parser)]
#[command(
    name = "sandbox-persistence",
    about = "Verify that volume data survives sandbox deletion and recreation"
)]
struct Cli {
    /// Lookups to spend waiting for a deleted sandbox to disappear
    #[arg(
        long,
        default_value_t = scenario::poller::DEFAULT_MAX_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_attempts: u32,
    /// Pause between lookups, in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,
    /// Suffix resource names with a per-run id so concurrent runs don't collide
    #[arg(long)]
    unique_names: bool,
    /// Keep polling through failed lookups instead of taking them as deletion
    #[arg(long)]
    strict_lookup: bool,
    /// Region for the volume and sandboxes (default: BL_REGION or the environment's default)
    #[arg(long)]
    region: Option<String>,
    /// Sandbox memory in MB
    #[arg(long, default_value_t = scenario::DEFAULT_MEMORY_MB)]
    memory: u32,
    /// Volume size in MB
    #[arg(long, default_value_t = scenario::DEFAULT_VOLUME_SIZE_MB)]
    volume_size: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sandbox_persistence=info,reqwest=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_tree::HierarchicalLayer::new(2)
                .with_targets(true)
                .with_bracketed_fields(false),
        )
        .init();

    match run(cli).await {
        Ok(report) => {
            let teardown = &report.teardown;
            tracing::info!(
                reached = %report.reached,
                deleted = teardown.deleted.len(),
                already_gone = teardown.already_gone.len(),
                failed = teardown.failed.len(),
                unconfirmed = teardown.unconfirmed.len(),
                "run finished"
            );
            match &report.outcome {
                Outcome::Success => tracing::info!("volume persistence test passed"),
                Outcome::Mismatch { expected, actual } => tracing::error!(
                    expected = %expected,
                    got = %actual,
                    "volume persistence test failed"
                ),
                Outcome::Aborted { stage, error } => tracing::error!(
                    stage = %stage,
                    error = %error,
                    "volume persistence test aborted"
                ),
            }
            ExitCode::from(report.exit_status())
        }
        Err(e) => {
            let error = format!("{e:#}");
            tracing::error!(error = %error, "test could not start");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunReport> {
    let config = Config::from_env();
    let profile = config.environment.profile();
    let region = cli.region.unwrap_or_else(|| config.region.clone());

    tracing::info!(
        environment = %config.environment,
        image = %config.image(),
        region = %region,
        available_regions = %profile.regions.join(", "),
        "using platform"
    );

    let platform_config = config.platform()?;
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
        .context("failed to build HTTP client")?;
    let client = PlatformClient::new(&platform_config, http);

    let names = if cli.unique_names {
        ResourceNames::unique()
    } else {
        ResourceNames::fixed()
    };

    let mut scenario_config = ScenarioConfig::new(names, config.image());
    scenario_config.region = Some(region);
    scenario_config.memory_mb = cli.memory;
    scenario_config.volume_size_mb = cli.volume_size;
    scenario_config.poll = PollPolicy {
        max_attempts: cli.max_attempts,
        interval: Duration::from_millis(cli.poll_interval_ms),
        transient: if cli.strict_lookup {
            TransientPolicy::CountAsAttempt
        } else {
            TransientPolicy::TreatAsAbsent
        },
    };

    Ok(Scenario::new(scenario_config).run(&client).await)
}
