//! devicefarm CLI - run mobile app tests on a remote device farm.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use devicefarm::api::HttpDeviceFarmClient;
use devicefarm::config::{self, Config};
use devicefarm::pipeline::{BuildArtifacts, DeviceFarmServer, ShardStatus, TestServer};
use devicefarm::report::print_summary;

#[derive(Parser)]
#[command(name = "devicefarm")]
#[command(about = "Run mobile app tests on a remote device farm", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "devicefarm.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the app, schedule a run and wait for its results
    Run {
        /// Application package to test
        #[arg(long)]
        app: PathBuf,

        /// Test package built alongside the app
        #[arg(long)]
        test_package: Option<PathBuf>,

        /// Directory for JUnit XML reports
        #[arg(long)]
        junit_dir: Option<PathBuf>,

        /// Schedule the run and exit without waiting for results
        #[arg(long)]
        no_wait: bool,
    },

    /// Wait for an existing run and write its report
    Report {
        /// ARN of the run
        #[arg(long)]
        run_arn: String,

        /// Directory for JUnit XML reports
        #[arg(long)]
        junit_dir: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let code = match cli.command {
        Commands::Run {
            app,
            test_package,
            junit_dir,
            no_wait,
        } => {
            let artifacts = BuildArtifacts { app, test_package };
            run_tests(&cli.config, artifacts, junit_dir, no_wait).await?
        }
        Commands::Report { run_arn, junit_dir } => {
            report_run(&cli.config, &run_arn, junit_dir).await?
        }
        Commands::Validate => validate_config(&cli.config)?,
        Commands::Init => init_config()?,
    };

    std::process::exit(code);
}

fn load(config_path: &Path, junit_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(dir) = junit_dir {
        config.report.junit_dir = Some(dir);
    }

    info!("Loaded configuration from {}", config_path.display());
    Ok(config)
}

/// Builds the service client and wires Ctrl-C to cancellation.
fn create_server(config: Config) -> Result<DeviceFarmServer> {
    let df = &config.devicefarm;
    let user_agent = df.user_agent();

    let mut client = HttpDeviceFarmClient::new(df.endpoint.clone(), &user_agent)
        .context("Failed to create Device Farm client")?;
    if let Some(var) = &df.token_env {
        match std::env::var(var) {
            Ok(token) => client = client.with_token(token),
            Err(_) => warn!("Token variable {} is not set", var),
        }
    }

    let http = reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .context("Failed to create HTTP client")?;

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            ctrl_c_token.cancel();
        }
    });

    Ok(DeviceFarmServer::new(config, Arc::new(client), http).with_cancellation_token(token))
}

async fn run_tests(
    config_path: &Path,
    artifacts: BuildArtifacts,
    junit_dir: Option<PathBuf>,
    no_wait: bool,
) -> Result<i32> {
    let mut config = load(config_path, junit_dir)?;
    if no_wait {
        config.report.wait = false;
    }

    let server = create_server(config)?;
    if !server.is_configured() {
        return Ok(1);
    }

    let result = server
        .upload_artifacts(&artifacts)
        .await
        .context("Device Farm run failed")?;

    for shard in &result.shards {
        println!(
            "{} {:?}: {}",
            console::style(&shard.name).bold(),
            shard.status,
            shard.console_url
        );
    }

    Ok(result.exit_code())
}

async fn report_run(config_path: &Path, run_arn: &str, junit_dir: Option<PathBuf>) -> Result<i32> {
    let config = load(config_path, junit_dir)?;
    let server = create_server(config)?;

    let shard = server
        .report_run(run_arn, run_arn)
        .await
        .with_context(|| format!("Failed to report on run {}", run_arn))?;

    match &shard.report {
        Some(report) => print_summary(report),
        None => println!("{} {:?}", console::style(run_arn).bold(), shard.status),
    }

    Ok(if shard.status == ShardStatus::Passed { 0 } else { 1 })
}

fn validate_config(config_path: &Path) -> Result<i32> {
    let config = match config::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return Ok(1);
        }
    };

    let problems = config.validate();
    if !problems.is_empty() {
        eprintln!("Configuration is not valid:");
        for problem in &problems {
            eprintln!("  - {}", problem);
        }
        return Ok(1);
    }

    println!("Configuration is valid!");
    println!();
    println!("Settings:");
    println!("  Project: {}", config.devicefarm.project);
    println!("  Device pool: {}", config.devicefarm.device_pool);
    println!("  Test type: {:?}", config.test.kind.test_type());
    println!("  Sharding: {}", config.sharding_requested());
    println!(
        "  Execution timeout: {}m",
        config.devicefarm.execution_timeout_minutes
    );
    println!("  Max wait: {}s", config.polling.max_wait_secs);
    match &config.report.junit_dir {
        Some(dir) => println!("  JUnit directory: {}", dir.display()),
        None => println!("  JUnit directory: (none)"),
    }

    Ok(0)
}

const STARTER_CONFIG: &str = r#"# devicefarm configuration file

[devicefarm]
project = "MyProject"
device_pool = "Top Devices"
execution_timeout_minutes = 60
sharding = false

[device_state]
locale = "en_US"

[test]
type = "instrumentation"

[features]
video = true
app_performance_monitoring = true

[polling]
upload_interval_secs = 5
run_interval_secs = 2
max_wait_secs = 3000

[report]
junit_dir = "build/test-results/devicefarm"
wait = true
"#;

fn init_config() -> Result<i32> {
    let path = PathBuf::from("devicefarm.toml");
    if path.exists() {
        eprintln!("devicefarm.toml already exists. Remove it first or edit manually.");
        return Ok(1);
    }

    std::fs::write(&path, STARTER_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created devicefarm.toml");
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  devicefarm run --app path/to/app.apk");

    Ok(0)
}
