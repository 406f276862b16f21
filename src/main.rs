use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use switch2sensor::accessory::switch_motion::switch_key;
use switch2sensor::accessory::{AccessoryContext, SwitchMotionAccessory};
use switch2sensor::config::{Config, load_dotenv};
use switch2sensor::host::{
    AccessoryHost, Characteristic, CharacteristicValue, MemoryHost, MqttHost, ServiceKey,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HostKind {
    /// Publish services over MQTT
    Mqtt,
    /// Keep services in memory, log every push and read on/off/get from stdin
    Console,
}

#[derive(Parser)]
#[command(name = "switch2sensor-bridge")]
#[command(about = "Virtual switch that pulses a linked motion sensor")]
struct Cli {
    /// JSON config file (defaults to ~/.config/switch2sensor/config.json if present)
    #[arg(long, env = "S2S_CONFIG")]
    config: Option<PathBuf>,

    /// Host the accessory is exposed through
    #[arg(long, value_enum, default_value_t = HostKind::Mqtt)]
    host: HostKind,

    /// Override the push interval in milliseconds
    #[arg(long)]
    push_interval_ms: Option<u64>,

    /// Log operational messages at info level
    #[arg(long)]
    logging: bool,
}

/// Read `on`/`off`/`get` commands from stdin and apply them to the switch.
///
/// Stdin is read on a dedicated thread so a pending read never holds up
/// runtime shutdown.
fn spawn_console_input(host: Arc<MemoryHost>, switch: ServiceKey) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel::<String>(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let Some(service) = host.service(&switch) else {
                continue;
            };
            let command = line.trim().to_ascii_lowercase();
            let result = match command.as_str() {
                "" => continue,
                "get" => service
                    .read(Characteristic::On)
                    .await
                    .map(|value| info!("[Console] On = {}", value)),
                other => service
                    .write(Characteristic::On, CharacteristicValue::from_payload(other))
                    .await,
            };
            if let Err(e) = result {
                warn!("[Console] {}: {}", command, e);
            }
        }
    })
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Load .env file before the runtime spawns any worker thread
    load_dotenv();
    init_logger();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cli));
}

async fn run(cli: Cli) {
    info!("Starting Switch2Sensor bridge");

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(interval) = cli.push_interval_ms {
        config.accessory.push_interval_ms = interval;
    }
    if cli.logging {
        config.accessory.logging = true;
    }

    info!("Configuration loaded:");
    info!("  Device Name: {}", config.device.name);
    info!("  Device ID: {}", config.device.identifier());
    info!("  Push Interval: {} ms", config.accessory.push_interval_ms);
    info!("  Auto Reset: {}", config.accessory.auto_reset);

    let context = AccessoryContext::new(config.device.name.clone(), config.device.identifier());

    let (host, host_task): (Arc<dyn AccessoryHost>, Option<JoinHandle<()>>) = match cli.host {
        HostKind::Mqtt => {
            info!(
                "  MQTT Broker: {}:{}",
                config.mqtt.broker_host, config.mqtt.broker_port
            );
            let (host, connection) = MqttHost::new(&config.mqtt, &context.identifier);
            let task = host.clone().start(connection);
            (host as Arc<dyn AccessoryHost>, Some(task))
        }
        HostKind::Console => {
            let host = Arc::new(MemoryHost::console());
            let task = spawn_console_input(host.clone(), switch_key(&context.identifier));
            (host as Arc<dyn AccessoryHost>, Some(task))
        }
    };

    let accessory =
        match SwitchMotionAccessory::new(host.as_ref(), context, config.accessory.clone()) {
            Ok(accessory) => accessory,
            Err(e) => {
                error!("Failed to create accessory: {}", e);
                std::process::exit(1);
            }
        };

    info!("Switch2Sensor bridge is running");
    info!("  - Press Ctrl+C to exit");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    accessory.shutdown().await;
    if let Some(task) = host_task {
        task.abort();
    }

    info!("Switch2Sensor bridge stopped");
}
