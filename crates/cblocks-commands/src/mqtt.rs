//! MQTT transport using rumqttc.
//!
//! One broker connection per process. Incoming publishes are dispatched to
//! the local subscription table from the event loop task; subscriptions are
//! replayed after every reconnect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use cblocks_core::config::mqtt;
use cblocks_core::error::{Error, Result};
use cblocks_core::transport::{
    Message, MessageHandler, PubSub, SubscriptionId, SubscriptionTable,
};

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    /// Generated as `cblocks_<uuid>` when absent.
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: mqtt::DEFAULT_BROKER.to_string(),
            port: mqtt::DEFAULT_PORT,
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: mqtt::DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

/// MQTT implementation of [`PubSub`].
pub struct MqttTransport {
    client: AsyncClient,
    client_id: String,
    subscriptions: Arc<SubscriptionTable>,
    event_task: JoinHandle<()>,
}

impl MqttTransport {
    /// Create the client and start the event loop task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: &MqttConfig) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", mqtt::DEFAULT_CLIENT_ID, uuid::Uuid::new_v4()));

        let mut options = MqttOptions::new(client_id.clone(), &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(u), Some(p)) = (&config.username, &config.password) {
            options.set_credentials(u, p);
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        let subscriptions = Arc::new(SubscriptionTable::new());
        let event_task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            subscriptions.clone(),
        ));

        info!(
            broker = %config.broker,
            port = config.port,
            client_id = %client_id,
            "MQTT transport started"
        );

        Self {
            client,
            client_id,
            subscriptions,
            event_task,
        }
    }

    /// Client ID used on the broker, also the response topic namespace.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Arc<SubscriptionTable>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = Message::new(publish.topic, publish.payload.to_vec());
                let handled = subscriptions.dispatch(&message);
                debug!(topic = %message.topic, handled, "MQTT message dispatched");
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected");
                // Requests are drained by this loop, so replay them from a separate task.
                resubscribe(client.clone(), subscriptions.filters());
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {}", e);
                // The next poll reconnects.
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Replay `filters` on the broker. Resolves to the number of accepted requests.
fn resubscribe(client: AsyncClient, filters: Vec<String>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut accepted = 0;
        for filter in filters {
            match client.subscribe(filter.as_str(), QoS::AtLeastOnce).await {
                Ok(()) => accepted += 1,
                Err(e) => error!(filter = %filter, "MQTT resubscribe failed: {}", e),
            }
        }
        accepted
    })
}

#[async_trait]
impl PubSub for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<SubscriptionId> {
        let standing = self.subscriptions.has_filter(filter);
        let id = self.subscriptions.add(filter, handler);

        if !standing {
            if let Err(e) = self.client.subscribe(filter, QoS::AtLeastOnce).await {
                self.subscriptions.remove(id);
                return Err(Error::Transport(e.to_string()));
            }
        }
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        if let Some(filter) = self.subscriptions.remove(id) {
            if !self.subscriptions.has_filter(&filter) {
                self.client
                    .unsubscribe(filter)
                    .await
                    .map_err(|e| Error::Transport(e.to_string()))?;
            }
        }
        Ok(())
    }
}
