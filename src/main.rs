use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use rotary_pointer::bridge::Bridge;
use rotary_pointer::config::BridgeConfig;
use rotary_pointer::emitter::UinputEmitter;
use rotary_pointer::gpio::GpioBinding;
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "rotary-pointer", version, about = "Drive the mouse pointer with a rotary encoder")]
struct Args {
    /// Config file, defaults to ~/.config/rotary-pointer/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup(args.log_level)?;

    let config = match &args.config {
        Some(path) => BridgeConfig::load(path).await?,
        None => BridgeConfig::load_or_default().await?,
    };

    if args.dump_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    info!("Creating virtual pointer");
    let bridge = Bridge::create(config.clone(), UinputEmitter::create)
        .map_err(|e| eyre!("Failed to create virtual pointer: {}", e))?;

    let bridge = bridge
        .start()
        .map_err(|e| eyre!("Failed to start bridge: {}", e))?;

    // Pins stay armed until the binding is dropped
    let gpio = match GpioBinding::attach(
        &config.pins,
        bridge.rotation_input(),
        bridge.button_input(),
    ) {
        Ok(gpio) => gpio,
        Err(e) => {
            error!("GPIO setup failed: {}", e);
            if let Err(shutdown_err) = bridge.run_until(async {}).await {
                warn!("Error while releasing the device: {}", shutdown_err);
            }
            return Err(eyre!("Failed to attach GPIO: {}", e));
        }
    };

    info!("Rotary pointer running, press Ctrl-C to stop");
    // Pins go quiet before the tasks wind down. A failed task drops the binding instead.
    let result = bridge
        .run_until(async move {
            shutdown_signal().await;
            gpio.detach();
        })
        .await;

    result.map_err(|e| eyre!("Bridge stopped with error: {}", e))
}

fn setup(level: Level) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env(level);
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
