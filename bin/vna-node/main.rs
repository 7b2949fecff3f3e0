use clap::Parser;
use env_logger::Env;
use log::{LevelFilter, error, info, warn};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use vna_driver::{
    AppConfig, ConnectionRequest, Connector, ServiceServer, SimulatedVna, TcpConnector,
    VnaDriver, VnaService, load_config, load_config_or_default,
};

/// VNA acquisition node
#[derive(Parser, Debug)]
#[command(name = "vna-node")]
#[command(about = "Serve VNA connection, sweep and trace requests over TCP", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override the service listen address
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Connect to this instrument address at startup
    #[arg(long, value_name = "ADDRESS")]
    connect: Option<String>,

    /// Serve a simulated analyzer instead of real hardware
    #[arg(long)]
    simulate: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // An explicit config file must load; otherwise fall back to defaults
    let mut config = match args.config.as_deref() {
        Some(path) => load_config(Some(path))?,
        None => load_config_or_default(None),
    };
    if let Some(bind) = args.bind.clone() {
        config.server.bind_address = bind;
    }
    if let Some(address) = args.connect.clone() {
        config.vna.address = Some(address);
    }

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.log_level.clone());
    initialize_logging(&log_level);
    log_startup_info(&config, args.simulate);

    let shutdown_flag = setup_shutdown_handler()?;

    if args.simulate {
        run(SimulatedVna::new(), &config, shutdown_flag)
    } else {
        let connector = TcpConnector::new(config.transport.connection_config())
            .with_default_port(config.vna.port);
        run(connector, &config, shutdown_flag)
    }
}

fn run<C: Connector + 'static>(
    connector: C,
    config: &AppConfig,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let driver = VnaDriver::with_identity(connector, config.vna.identity());
    let service = Arc::new(VnaService::new(driver));

    if let Some(address) = &config.vna.address {
        let response = service.connection(&ConnectionRequest {
            connection: true,
            ip_addr: address.clone(),
        });
        if response.success {
            info!("Connected to VNA at {address}");
        } else {
            warn!("Startup connection to {address} failed: {}", response.message);
        }
    }

    let mut server = ServiceServer::bind(&config.server.bind_address, Arc::clone(&service))?;
    server.set_shutdown_flag(shutdown_flag);

    let result = server.run();

    service.driver().disconnect();
    info!("Node is shut down");

    result.map_err(|e| {
        error!("Service server failed: {e}");
        e.into()
    })
}

/// Log startup information
fn log_startup_info(config: &AppConfig, simulate: bool) {
    info!("=== VNA acquisition node ===");
    info!(
        "Expected instrument: {} {}",
        config.vna.expected_vendor, config.vna.expected_model
    );
    if simulate {
        info!("Instrument: simulated");
    } else {
        info!("Instrument port: {}", config.vna.port);
    }
    info!("Service address: {}", config.server.bind_address);
}

/// Setup Ctrl+C handler for graceful shutdown
fn setup_shutdown_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received - shutting down...");
        shutdown_flag_clone.store(true, Ordering::SeqCst);
    })?;

    Ok(shutdown_flag)
}

fn initialize_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}
