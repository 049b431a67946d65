pub mod channels;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod mqtt;
pub mod options;
pub mod prelude;
pub mod voltronic;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;

use crate::coordinator::Coordinator;
use crate::mqtt::Mqtt;
use crate::options::Options;
use crate::voltronic::channel::DeviceChannel;
use crate::voltronic::device::Hidraw;
use crate::voltronic::discovery;

use std::io::Write;
use std::time::Duration;

/// Runs the bridge until `shutdown_rx` fires, the optional runtime limit
/// passes, or the coordinator gives up on the device.
pub async fn app(mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let options = Options::new();

    let config = Config::new(&options.config_file)
        .map_err(|err| anyhow!("failed to load {}: {}", options.config_file, err))?;

    init_logging(config.loglevel());

    info!("inverter-bridge {} starting", CARGO_PKG_VERSION);
    config.log_summary();

    let path = resolve_device(&options, &config)?;
    info!("using device {}", path);

    let channels = Channels::new();
    let device = DeviceChannel::new(Hidraw::new(&path), config.device().read_settings());

    let coordinator = Coordinator::new(config.clone(), channels.clone(), device);
    let mqtt = Mqtt::new(config.clone(), channels.clone(), coordinator.shared_stats.clone());

    let mqtt_handle = {
        let mqtt = mqtt.clone();
        let outbox = channels.to_mqtt.subscribe();
        tokio::spawn(async move {
            if let Err(e) = mqtt.start(outbox).await {
                error!("MQTT task failed: {}", e);
            }
        })
    };

    let mut coordinator_handle = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.start().await })
    };

    let runtime_limit = async {
        match options.runtime {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => futures::future::pending::<()>().await,
        }
    };

    let finished = tokio::select! {
        result = &mut coordinator_handle => Some(result),
        _ = shutdown_rx.recv() => {
            info!("shutdown signal received");
            None
        }
        _ = runtime_limit => {
            info!("runtime limit of {}s reached", options.runtime.unwrap_or_default());
            None
        }
    };

    info!("stopping components...");
    coordinator.stop();
    mqtt.stop();

    let result = match finished {
        Some(result) => result,
        None => coordinator_handle.await,
    };

    if let Err(e) = mqtt_handle.await {
        error!("error waiting for mqtt task: {}", e);
    }

    coordinator.print_summary();
    info!("shutdown complete");

    result?
}

fn init_logging(loglevel: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(loglevel))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();
}

// -d wins over config/DEVICE_FILE, which win over sysfs discovery
fn resolve_device(options: &Options, config: &Config) -> Result<String> {
    if let Some(path) = options.device.as_deref().or(config.device().path()) {
        return Ok(path.to_string());
    }

    let (vid, pid) = (config.device().vendor_id(), config.device().product_id());
    match discovery::find_device(vid, pid) {
        Some(path) => {
            info!("found {:04x}:{:04x} at {}", vid, pid, path.display());
            Ok(path.display().to_string())
        }
        None => bail!(
            "no hidraw device matching {:04x}:{:04x}; set device.path, DEVICE_FILE or --device",
            vid,
            pid
        ),
    }
}
