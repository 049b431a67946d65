use crate::prelude::*;
use crate::coordinator::PollStats;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, Outgoing, Publish, QoS};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PUBLISH_ATTEMPTS: u32 = 3;
const PUBLISH_RETRY_SECS: u64 = 2;
const RECONNECT_DELAY_SECS: u64 = 5;

pub const AVAILABILITY_TOPIC: &str = "availability";
pub const SET_MODE_TOPIC: &str = "set_mode";

// Message {{{
/// A message with its topic relative to the configured namespace.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    pub fn for_status(status: &StatusRecord, publish_json: bool) -> Result<Vec<Message>> {
        let mut r: Vec<Message> = status
            .pairs()
            .into_iter()
            .map(|(topic, payload)| Message {
                topic: topic.to_string(),
                retain: false,
                payload,
            })
            .collect();

        if publish_json {
            r.push(Message {
                topic: "status".to_string(),
                retain: false,
                payload: serde_json::to_string(status)?,
            });
        }

        Ok(r)
    }

    pub fn for_mode(mode: OperatingMode) -> Vec<Message> {
        ["mode", "actual_mode"]
            .into_iter()
            .map(|topic| Message {
                topic: topic.to_string(),
                retain: false,
                payload: mode.to_string(),
            })
            .collect()
    }

    pub fn for_desired_mode(target: ModeTarget) -> Message {
        Message {
            topic: Command::SetMode(target).to_result_topic(),
            retain: false,
            payload: target.code().to_string(),
        }
    }

    pub fn availability(online: bool) -> Message {
        Message {
            topic: AVAILABILITY_TOPIC.to_string(),
            retain: true,
            payload: if online { "online" } else { "offline" }.to_string(),
        }
    }

    pub fn to_command(&self) -> Result<Command> {
        match self.topic.as_str() {
            SET_MODE_TOPIC => Ok(Command::SetMode(self.payload.parse()?)),
            _ => bail!("unhandled: {:?}", self),
        }
    }
} // }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Message(Message),
    Shutdown,
}

#[derive(Clone)]
pub struct Mqtt {
    config: Config,
    channels: Channels,
    shared_stats: Arc<Mutex<PollStats>>,
}

impl Mqtt {
    pub fn new(config: Config, channels: Channels, shared_stats: Arc<Mutex<PollStats>>) -> Self {
        Self {
            config,
            channels,
            shared_stats,
        }
    }

    /// `outbox` must be subscribed to `to_mqtt` before the coordinator
    /// starts, so nothing it publishes early is lost.
    pub async fn start(&self, outbox: broadcast::Receiver<ChannelData>) -> Result<()> {
        let c = self.config.mqtt();

        if !c.enabled() {
            info!("mqtt disabled, skipping");
            return Ok(());
        }

        let mut options = MqttOptions::new(c.client_id(), c.host(), c.port());

        let will = LastWill {
            topic: self.full_topic(AVAILABILITY_TOPIC),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(c.keepalive());
        if let (Some(u), Some(p)) = (c.username(), c.password()) {
            options.set_credentials(u, p);
        }

        info!("initializing mqtt at {}:{}", c.host(), c.port());

        let (client, eventloop) = AsyncClient::new(options, 64);

        futures::try_join!(self.receiver(client.clone(), eventloop), self.sender(client, outbox))?;

        Ok(())
    }

    pub fn stop(&self) {
        info!("Stopping MQTT client...");
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
    }

    // runs on every (re)connect, the session is clean so subscriptions are gone
    fn on_connect(&self, client: &AsyncClient) -> Result<()> {
        let online = Message::availability(true);
        client.try_publish(
            self.full_topic(&online.topic),
            QoS::AtLeastOnce,
            online.retain,
            online.payload,
        )?;

        let topic = self.full_topic(SET_MODE_TOPIC);
        info!("subscribing to {}", topic);
        client.try_subscribe(topic, QoS::AtMostOnce)?;

        Ok(())
    }

    // mqtt -> coordinator
    async fn receiver(&self, client: AsyncClient, mut eventloop: EventLoop) -> Result<()> {
        let mut shutdown_rx = self.channels.to_mqtt.subscribe();
        let mut shutting_down = false;

        loop {
            let event = if shutting_down {
                // drain the offline message and disconnect queued by sender()
                match tokio::time::timeout(Duration::from_secs(2), eventloop.poll()).await {
                    Ok(event) => event,
                    Err(_) => break,
                }
            } else {
                tokio::select! {
                    event = eventloop.poll() => event,
                    msg = shutdown_rx.recv() => {
                        if matches!(msg, Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                            shutting_down = true;
                        }
                        continue;
                    }
                }
            };

            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("connected to mqtt broker");
                    self.on_connect(&client)?;
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    self.handle_message(publish)?;
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("MQTT disconnected");
                    break;
                }
                Err(e) => {
                    if shutting_down {
                        break;
                    }
                    error!("{}", e);
                    info!("reconnecting in {}s", RECONNECT_DELAY_SECS);
                    tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                }
                _ => {} // keepalives etc
            }
        }

        info!("MQTT receiver loop exiting");
        Ok(())
    }

    fn handle_message(&self, publish: Publish) -> Result<()> {
        let namespace = self.config.mqtt().namespace();
        let Some(topic) = publish
            .topic
            .strip_prefix(namespace)
            .and_then(|t| t.strip_prefix('/'))
        else {
            warn!("ignoring message on unexpected topic {}", publish.topic);
            return Ok(());
        };

        let message = Message {
            topic: topic.to_owned(),
            retain: publish.retain,
            payload: String::from_utf8_lossy(&publish.payload).into_owned(),
        };
        debug!("RX: {:?}", message);
        if self
            .channels
            .from_mqtt
            .send(ChannelData::Message(message))
            .is_err()
        {
            bail!("send(from_mqtt) failed - channel closed?");
        }

        Ok(())
    }

    // coordinator -> mqtt
    async fn sender(
        &self,
        client: AsyncClient,
        mut receiver: broadcast::Receiver<ChannelData>,
    ) -> Result<()> {
        loop {
            let data = match receiver.recv().await {
                Ok(data) => data,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("MQTT sender lagged, {} messages dropped", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match data {
                ChannelData::Shutdown => {
                    info!("MQTT sender received shutdown signal");
                    let _ = self.publish(&client, Message::availability(false)).await;
                    let _ = client.disconnect().await;
                    break;
                }
                ChannelData::Message(message) => {
                    let _ = self.publish(&client, message).await;
                }
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }

    async fn publish(&self, client: &AsyncClient, message: Message) -> Result<()> {
        let topic = self.full_topic(&message.topic);
        debug!("publishing: {} = {}", topic, message.payload);

        let payload = message.payload.into_bytes();
        let mut attempt = 1;
        loop {
            match client
                .publish(&topic, QoS::AtLeastOnce, message.retain, payload.clone())
                .await
            {
                Ok(_) => {
                    if let Ok(mut stats) = self.shared_stats.lock() {
                        stats.mqtt_messages_sent += 1;
                    }
                    return Ok(());
                }
                Err(err) => {
                    if let Ok(mut stats) = self.shared_stats.lock() {
                        stats.mqtt_errors += 1;
                    }
                    if attempt >= PUBLISH_ATTEMPTS {
                        error!("MQTT publish to {} failed, giving up: {:?}", topic, err);
                        bail!("publish to {} failed", topic);
                    }
                    error!(
                        "MQTT publish failed: {:?} - retrying in {}s (attempt {}/{})",
                        err, PUBLISH_RETRY_SECS, attempt, PUBLISH_ATTEMPTS
                    );
                    tokio::time::sleep(Duration::from_secs(PUBLISH_RETRY_SECS)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn full_topic(&self, topic: &str) -> String {
        format!("{}/{}", self.config.mqtt().namespace(), topic)
    }
}
