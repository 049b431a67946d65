use crate::prelude::*;
use crate::error::CoordinatorError;

pub mod commands;

use commands::{query_mode::QueryMode, query_status::QueryStatus, set_mode::SetMode};
use crate::voltronic::channel::{ChannelStats, DeviceChannel};
use crate::voltronic::device::Device;

use std::sync::{Arc, Mutex};

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Shutdown,
}

#[derive(Default, Debug, Clone)]
pub struct PollStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub status_ok: u64,
    pub status_failed: u64,
    pub mode_ok: u64,
    pub mode_failed: u64,
    pub mode_commands: u64,
    pub mode_command_errors: u64,
    pub mqtt_messages_sent: u64,
    pub mqtt_errors: u64,
}

impl PollStats {
    pub fn print_summary(&self, channel: &ChannelStats) {
        info!("Poll Statistics:");
        info!("  Cycles: {} ({} failed)", self.cycles, self.failed_cycles);
        info!("  Status queries: {} ok, {} failed", self.status_ok, self.status_failed);
        info!("  Mode queries: {} ok, {} failed", self.mode_ok, self.mode_failed);
        info!("  Mode commands: {} ({} errors)", self.mode_commands, self.mode_command_errors);
        info!("  Device:");
        info!("    Frames sent: {}", channel.frames_sent);
        info!("    Frames received: {}", channel.frames_received);
        info!("    Timeouts: {}", channel.timeouts);
        info!("    Resends: {}", channel.resends);
        info!("    Reopens: {}", channel.reopens);
        info!("    Stale bytes flushed: {}", channel.bytes_flushed);
        info!("  MQTT:");
        info!("    Messages sent: {}", self.mqtt_messages_sent);
        info!("    Errors: {}", self.mqtt_errors);
    }
}

// FailureCounter {{{
/// Consecutive failed poll cycles. Only the poll loop touches it.
#[derive(Debug, Clone)]
pub struct FailureCounter {
    count: u32,
    threshold: u32,
}

impl FailureCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    /// Records one cycle and returns the consecutive failure count.
    pub fn record(&mut self, success: bool) -> u32 {
        if success {
            self.count = 0;
        } else {
            self.count += 1;
        }
        self.count
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn tripped(&self) -> bool {
        self.count >= self.threshold
    }
} // }}}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub status: Option<StatusRecord>,
    pub mode: Option<OperatingMode>,
}

impl CycleOutcome {
    /// Either query getting through means the inverter is alive.
    pub fn is_success(&self) -> bool {
        self.status.is_some() || self.mode.is_some()
    }
}

pub struct Coordinator<D: Device + 'static> {
    config: Config,
    channels: Channels,
    device: Arc<Mutex<DeviceChannel<D>>>,
    pub shared_stats: Arc<Mutex<PollStats>>,
}

impl<D: Device + 'static> Clone for Coordinator<D> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            channels: self.channels.clone(),
            device: self.device.clone(),
            shared_stats: self.shared_stats.clone(),
        }
    }
}

impl<D: Device + 'static> Coordinator<D> {
    pub fn new(config: Config, channels: Channels, device: DeviceChannel<D>) -> Self {
        Self::new_with_stats(config, channels, device, Arc::new(Mutex::new(PollStats::default())))
    }

    pub fn new_with_stats(
        config: Config,
        channels: Channels,
        device: DeviceChannel<D>,
        shared_stats: Arc<Mutex<PollStats>>,
    ) -> Self {
        Self {
            config,
            channels,
            device: Arc::new(Mutex::new(device)),
            shared_stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        if self.config.mqtt().enabled() {
            futures::try_join!(self.poll_loop(), self.mqtt_receiver())?;
        } else {
            self.poll_loop().await?;
        }

        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_coordinator.send(ChannelData::Shutdown);

        if self.config.mqtt().enabled() {
            let _ = self.channels.from_mqtt.send(mqtt::ChannelData::Shutdown);
        }
    }

    /// Cycles status and mode queries until shutdown, or until too many
    /// cycles in a row have failed.
    pub async fn poll_loop(&self) -> Result<()> {
        let mut shutdown_rx = self.channels.to_coordinator.subscribe();
        let mut failures = FailureCounter::new(self.config.poll().failure_threshold());
        let interval = self.config.poll().interval();

        loop {
            let outcome = self.run_cycle().await?;

            let count = failures.record(outcome.is_success());
            if count > 0 {
                warn!(
                    "poll cycle failed ({}/{} consecutive)",
                    count,
                    self.config.poll().failure_threshold()
                );
            }
            if failures.tripped() {
                error!("too many consecutive errors ({}), exiting for restart", count);
                self.stop_mqtt();
                return Err(CoordinatorError::FailureThreshold { count }.into());
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.recv() => {
                    info!("poll loop received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }

    /// One status + mode exchange under the device lock, then publish.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let outcome = self.poll_once().await?;

        if let Ok(mut stats) = self.shared_stats.lock() {
            stats.cycles += 1;
            if !outcome.is_success() {
                stats.failed_cycles += 1;
            }
            if outcome.status.is_some() {
                stats.status_ok += 1;
            } else {
                stats.status_failed += 1;
            }
            if outcome.mode.is_some() {
                stats.mode_ok += 1;
            } else {
                stats.mode_failed += 1;
            }
        }

        if let Some(status) = &outcome.status {
            self.publish(mqtt::Message::for_status(status, self.config.mqtt().publish_json())?);
        }
        if let Some(mode) = outcome.mode {
            self.publish(mqtt::Message::for_mode(mode));
        }

        Ok(outcome)
    }

    async fn poll_once(&self) -> Result<CycleOutcome> {
        let device = self.device.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut channel = device.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

            let status = match QueryStatus::new(&mut channel).run() {
                Ok(status) => Some(status),
                Err(err) => {
                    warn!("{}", err);
                    None
                }
            };

            let mode = QueryMode::new(&mut channel).run();
            if mode.is_none() {
                warn!("QMOD: no valid data");
            }

            CycleOutcome { status, mode }
        })
        .await?;

        Ok(outcome)
    }

    async fn mqtt_receiver(&self) -> Result<()> {
        let mut receiver = self.channels.from_mqtt.subscribe();

        loop {
            match receiver.recv().await {
                Ok(mqtt::ChannelData::Message(message)) => {
                    let _ = self.process_message(message).await;
                }
                Ok(mqtt::ChannelData::Shutdown) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("coordinator lagged, {} mqtt messages dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        Ok(())
    }

    pub async fn process_message(&self, message: mqtt::Message) -> Result<()> {
        match message.to_command() {
            Ok(command) => {
                info!("parsed command {:?}", command);
                if let Err(err) = self.process_command(command).await {
                    error!("{:?} failed: {}", command, err);
                    if let Ok(mut stats) = self.shared_stats.lock() {
                        stats.mode_command_errors += 1;
                    }
                    return Err(err);
                }
            }
            Err(err) => {
                warn!("ignoring {:?}: {}", message, err);
            }
        }

        Ok(())
    }

    pub async fn process_command(&self, command: Command) -> Result<()> {
        match command {
            Command::SetMode(target) => {
                let device = self.device.clone();

                tokio::task::spawn_blocking(move || {
                    let mut channel = device.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    SetMode::new(&mut channel, target).run()
                })
                .await??;

                if let Ok(mut stats) = self.shared_stats.lock() {
                    stats.mode_commands += 1;
                }
                self.publish(vec![mqtt::Message::for_desired_mode(target)]);
            }
        }

        Ok(())
    }

    pub fn channel_stats(&self) -> ChannelStats {
        self.device
            .lock()
            .map(|channel| channel.stats().clone())
            .unwrap_or_default()
    }

    pub fn print_summary(&self) {
        if let Ok(stats) = self.shared_stats.lock() {
            stats.print_summary(&self.channel_stats());
        }
    }

    fn publish(&self, messages: Vec<mqtt::Message>) {
        if !self.config.mqtt().enabled() {
            for message in messages {
                debug!("{} = {}", message.topic, message.payload);
            }
            return;
        }

        for message in messages {
            if self
                .channels
                .to_mqtt
                .send(mqtt::ChannelData::Message(message))
                .is_err()
            {
                warn!("send(to_mqtt) failed - mqtt not running?");
                break;
            }
        }
    }

    // lets the mqtt task mark us offline before the process exits
    fn stop_mqtt(&self) {
        if self.config.mqtt().enabled() {
            let _ = self.channels.to_mqtt.send(mqtt::ChannelData::Shutdown);
            let _ = self.channels.from_mqtt.send(mqtt::ChannelData::Shutdown);
        }
    }
}
