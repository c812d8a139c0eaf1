use anyhow::{Context, Result};
use clap::Parser;
use owlwatch::alerts::AlertType;
use owlwatch::config::{CameraConfig, CameraProfile, CameraThresholdConfig};
use owlwatch::{JsonLinesSampleSource, OwlwatchConfig, OwlwatchOrchestrator};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

#[derive(Parser, Debug)]
#[command(name = "owlwatch")]
#[command(about = "Owl presence confidence scoring and prioritized alerting")]
#[command(version)]
#[command(long_about = "Turns per-camera detection samples into a stable owl-presence \
decision and a prioritized, cooldown-limited stream of alerts across several cameras. \
Samples are replayed from a JSON-lines file, one array of samples per detection cycle.")]
struct Args {
    #[arg(short, long, default_value = "owlwatch.toml", help = "Path to TOML configuration file")]
    config: String,

    #[arg(short, long, value_name = "FILE", help = "JSON-lines file of detection samples to replay")]
    samples: Option<PathBuf>,

    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[arg(long, value_name = "DIR", help = "Also write daily-rotated logs to this directory")]
    log_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Write alert statistics as JSON on shutdown")]
    stats_out: Option<PathBuf>,

    #[arg(long, value_name = "MS", help = "Override the cycle interval while replaying (0 = back to back)")]
    replay_interval_ms: Option<u64>,

    #[arg(long, value_name = "CAMERA", help = "Send a test alert for this camera and exit")]
    send_test_alert: Option<String>,

    #[arg(long, help = "Score samples and log presence without sending alerts")]
    dry_run: bool,

    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    #[arg(long, help = "Print an example configuration in TOML format and exit")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(ExitCode::SUCCESS);
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting Owlwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match OwlwatchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            return Ok(ExitCode::FAILURE);
        }
        return Err(e.into());
    }
    if args.validate_config {
        println!("✓ Configuration is valid ({} cameras)", config.cameras.len());
        return Ok(ExitCode::SUCCESS);
    }

    let grace = Duration::from_secs(config.alerts.dispatch_grace_seconds);
    let mut orchestrator = OwlwatchOrchestrator::new(config).map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    if let Some(camera) = &args.send_test_alert {
        let coordinator = orchestrator.coordinator();
        coordinator.send_test_alert(camera);
        let delivered = coordinator.shutdown(grace).await;
        println!(
            "Test alert for camera '{}' {}",
            camera,
            if delivered { "sent" } else { "timed out" }
        );
        return Ok(ExitCode::SUCCESS);
    }

    let samples = args
        .samples
        .as_ref()
        .context("--samples is required to run detection cycles")?;
    let source = JsonLinesSampleSource::open(samples).await?;

    orchestrator.set_dry_run(args.dry_run);
    orchestrator.set_stats_output(args.stats_out.clone());
    if let Some(ms) = args.replay_interval_ms {
        orchestrator.set_cycle_interval(Duration::from_millis(ms));
    }

    let exit_code = orchestrator.run(source).await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Owlwatch exited with code: {}", exit_code);
    // The log guard drops on return and flushes the rolling file
    Ok(exit_status(exit_code))
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("owlwatch={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // Rolling file output is always JSON so it can be shipped as-is
    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let (writer, guard) = rolling_file_writer(dir);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Non-blocking daily log file. Buffered lines are only written once the
/// guard is dropped, so it must outlive every log call.
fn rolling_file_writer(dir: &Path) -> (NonBlocking, WorkerGuard) {
    let appender = tracing_appender::rolling::daily(dir, "owlwatch.log");
    tracing_appender::non_blocking(appender)
}

fn exit_status(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}

/// Print an example configuration in TOML format
fn print_default_config() -> Result<()> {
    let mut config = OwlwatchConfig::default();
    config.notification.recipients = vec!["owls@example.com".to_string()];
    config.cameras.insert(
        "box".to_string(),
        CameraConfig {
            profile: CameraProfile::Enclosure,
            base_alert_type: AlertType::OwlInBox,
            day: Some(CameraThresholdConfig::new(60.0, 2)),
            night: Some(CameraThresholdConfig::new(55.0, 3)),
            ..CameraConfig::default()
        },
    );
    config.cameras.insert(
        "area".to_string(),
        CameraConfig {
            profile: CameraProfile::Outdoor,
            base_alert_type: AlertType::OwlInArea,
            ..CameraConfig::default()
        },
    );

    println!("# Owlwatch Configuration File");
    println!("# Every value can be overridden with OWLWATCH__SECTION__KEY environment variables");
    println!();
    println!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to render default configuration")?
    );
    Ok(())
}
