use anyhow::Result;
use clap::Parser;
use kioskcam::{
    CameraProvider, KioskcamConfig, KioskcamOrchestrator, LoggingIdleController,
    MockCameraProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "kioskcam")]
#[command(about = "Camera motion and presence sensing for kiosk displays")]
#[command(version)]
#[command(long_about = "Watches a camera feed for motion and human presence, wakes the \
display when someone approaches and keeps it awake while they stay. Runs until SIGINT or \
SIGTERM.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "kioskcam.toml", help = "Path to TOML configuration file")]
    config: String,

    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    #[arg(long, help = "Use the synthetic mock camera instead of a capture device")]
    mock_camera: bool,

    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("# Kioskcam configuration (defaults)");
        println!("{}", KioskcamConfig::default().to_toml()?);
        return Ok(());
    }

    init_logging(&args);

    info!("Starting Kioskcam v{}", env!("CARGO_PKG_VERSION"));

    let config = KioskcamConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let camera = camera_provider(&args, &config)?;

    let mut orchestrator =
        KioskcamOrchestrator::new(config, camera, Arc::new(LoggingIdleController)).map_err(
            |e| {
                error!("Failed to create orchestrator: {}", e);
                e
            },
        )?;

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start detection: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Kioskcam exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn camera_provider(args: &Args, config: &KioskcamConfig) -> Result<Arc<dyn CameraProvider>> {
    if args.mock_camera {
        return Ok(mock_camera());
    }
    let provider = kioskcam::GStreamerCameraProvider::new(config.camera.device_index)?;
    Ok(Arc::new(provider))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
fn camera_provider(args: &Args, _config: &KioskcamConfig) -> Result<Arc<dyn CameraProvider>> {
    if !args.mock_camera {
        tracing::warn!("Built without the camera feature; using the mock camera");
    }
    Ok(mock_camera())
}

fn mock_camera() -> Arc<dyn CameraProvider> {
    let camera = MockCameraProvider::authorized();
    let _feed = camera.start_synthetic_feed(Duration::from_millis(200));
    info!("Using synthetic mock camera");
    Arc::new(camera)
}

fn init_logging(args: &Args) {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("kioskcam={}", log_level)));

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
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}
