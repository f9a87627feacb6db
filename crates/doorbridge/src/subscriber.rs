//! MQTT subscription loop.
//!
//! Connects to the broker, subscribes to the handler's topics and feeds it
//! each publish, one at a time. The first connection must succeed; after
//! that, connection errors are logged and the event loop reconnects on the
//! next poll, resubscribing on every ConnAck.

use std::time::Duration;

use anyhow::{Context, Result};
use doorconf::MqttConfig;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pipeline::MessageHandler;

/// Capacity of the client → event loop request channel.
const REQUEST_CAPACITY: usize = 64;

/// Pause between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Connection settings for one bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberConfig {
    pub client_id: String,
    pub broker: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub credentials: Option<(String, String)>,
}

impl SubscriberConfig {
    /// Settings for `bridge` (e.g. `"log"`), with a per-process client id.
    pub fn from_mqtt(mqtt: &MqttConfig, bridge: &str) -> Self {
        Self {
            client_id: client_id(bridge),
            broker: mqtt.broker.clone(),
            port: mqtt.port,
            keep_alive: Duration::from_secs(mqtt.keep_alive_secs),
            credentials: mqtt
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
        }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        }
        options
    }
}

/// `doorbridge-<bridge>-<pid>`
pub fn client_id(bridge: &str) -> String {
    format!("doorbridge-{}-{}", bridge, std::process::id())
}

/// Run `handler` against the broker until `shutdown` is cancelled.
///
/// Returns an error only if the first connection attempt fails. On return
/// the handler has been shut down and the client disconnected.
pub async fn run(
    config: SubscriberConfig,
    handler: &mut dyn MessageHandler,
    shutdown: CancellationToken,
) -> Result<()> {
    let (client, mut eventloop) = AsyncClient::new(config.options(), REQUEST_CAPACITY);
    let topics = handler.topics();

    info!(
        "connecting to {}:{} as {}",
        config.broker, config.port, config.client_id
    );

    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            info!("shutdown requested before the broker connection was established");
            handler.shutdown();
            return Ok(());
        }
        connected = wait_for_connack(&mut eventloop) => {
            connected.with_context(|| {
                format!("failed to connect to MQTT broker {}:{}", config.broker, config.port)
            })?;
        }
    }

    info!("connected to {}:{}", config.broker, config.port);
    subscribe(&client, &topics).await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handler.handle(&publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("reconnected to {}:{}", config.broker, config.port);
                    subscribe(&client, &topics).await;
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!("subscription acknowledged: {:?}", ack.return_codes);
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}; retrying in {:?}", e, RECONNECT_DELAY);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            },
        }
    }

    info!("shutting down subscriber");
    handler.shutdown();

    if let Err(e) = client.disconnect().await {
        debug!("disconnect request not queued: {}", e);
    } else {
        // One more poll sends the Disconnect packet
        let _ = tokio::time::timeout(Duration::from_secs(1), eventloop.poll()).await;
    }

    Ok(())
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Packet::ConnAck(_)) => return Ok(()),
            other => debug!("event before ConnAck: {:?}", other),
        }
    }
}

async fn subscribe(client: &AsyncClient, topics: &[String]) {
    for topic in topics {
        match client.subscribe(topic.as_str(), QoS::AtMostOnce).await {
            Ok(()) => info!("subscribed to {}", topic),
            Err(e) => warn!("failed to subscribe to {}: {}", topic, e),
        }
    }
}
