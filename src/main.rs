use log::error;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        let _ = shutdown_tx.send(());
    });

    if let Err(err) = inverter_bridge::app(shutdown_rx).await {
        // the logger may not be up yet if config loading failed
        error!("{:#}", err);
        eprintln!("inverter-bridge: {:#}", err);
        std::process::exit(1);
    }
}
