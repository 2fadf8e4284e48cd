//! Resource write protocol.
//!
//! A write publishes the JSON value on the resource input topic and waits
//! for the device to answer on one of:
//! - the resource output topic (confirmation carrying the new value)
//! - the resource error topic (device failure)
//! - the client's response topic, with an envelope naming the output topic
//!
//! Only one write per `(client_id, address)` is in flight at a time. A second
//! write to the same key fails with `Busy` instead of queueing.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{oneshot, OnceCell};
use tracing::{debug, warn};

use cblocks_core::error::{Error, Result};
use cblocks_core::resource::ResourceAddress;
use cblocks_core::topic::{self, InboundTopic};
use cblocks_core::transport::{Message, MessageHandler, PubSub};

/// Correlation key of an in-flight write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WriteKey {
    pub client_id: String,
    pub address: ResourceAddress,
}

impl WriteKey {
    pub fn new(client_id: impl Into<String>, address: ResourceAddress) -> Self {
        Self {
            client_id: client_id.into(),
            address,
        }
    }
}

impl fmt::Display for WriteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.client_id, self.address)
    }
}

struct PendingWrite {
    seq: u64,
    tx: oneshot::Sender<Result<Value>>,
}

type PendingTable = Arc<Mutex<HashMap<WriteKey, PendingWrite>>>;

/// Payload of a `{client_id}/responses` message.
#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    topic: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Write-and-confirm protocol over a publish/subscribe transport.
pub struct ResourceWriteProtocol {
    transport: Arc<dyn PubSub>,
    pending: PendingTable,
    handler: MessageHandler,
    subscribed: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
    next_seq: AtomicU64,
    timeout: Duration,
}

impl ResourceWriteProtocol {
    pub fn new(transport: Arc<dyn PubSub>, timeout: Duration) -> Self {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let handler: MessageHandler = {
            let pending = pending.clone();
            Arc::new(move |message: &Message| dispatch(&pending, message))
        };

        Self {
            transport,
            pending,
            handler,
            subscribed: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of writes awaiting a device answer.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, client_id: &str, address: &ResourceAddress) -> bool {
        self.pending
            .lock()
            .contains_key(&WriteKey::new(client_id, *address))
    }

    /// Publish `value` to a resource and wait for the device's answer.
    ///
    /// Resolves with the confirmed value, or fails with `Device`, `Timeout`
    /// or `Busy`. Dropping the returned future removes the pending entry.
    pub async fn write(
        &self,
        client_id: &str,
        address: ResourceAddress,
        value: &Value,
    ) -> Result<Value> {
        let key = WriteKey::new(client_id, address);
        let payload = serde_json::to_vec(value)?;

        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.pending.lock();
            if pending.contains_key(&key) {
                return Err(Error::Busy(key.to_string()));
            }
            pending.insert(key.clone(), PendingWrite { seq, tx });
        }
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            key: key.clone(),
            seq,
        };

        self.ensure_subscriptions(client_id, &address).await?;

        let topic = topic::resource_input_topic(
            client_id,
            address.object_id,
            address.instance_id,
            address.resource_id,
        );
        self.transport.publish(&topic, payload).await?;
        debug!(client_id, resource = %address, topic = %topic, "Write published");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(confirmed))) => {
                debug!(client_id, resource = %address, value = %confirmed, "Write confirmed");
                Ok(confirmed)
            }
            Ok(Ok(Err(e))) => {
                warn!(client_id, resource = %address, error = %e, "Write rejected by device");
                Err(e)
            }
            Ok(Err(_)) => Err(Error::Transport(format!("Write {} was abandoned", key))),
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(client_id, resource = %address, timeout_ms, "Write timed out");
                Err(Error::Timeout(timeout_ms))
            }
        }
    }

    /// Subscribe to every topic a device may answer on, once per topic.
    ///
    /// A writer that finds a subscription still being established waits for
    /// it before publishing.
    async fn ensure_subscriptions(&self, client_id: &str, address: &ResourceAddress) -> Result<()> {
        let (o, i, r) = (address.object_id, address.instance_id, address.resource_id);
        let filters = [
            topic::resource_output_topic(o, i, r),
            topic::publish_error_topic(o, i, r),
            topic::response_topic(client_id),
        ];

        for filter in filters {
            let cell = self
                .subscribed
                .lock()
                .entry(filter.clone())
                .or_default()
                .clone();

            // A failed subscribe leaves the cell empty so the next writer retries.
            cell.get_or_try_init(|| async {
                self.transport
                    .subscribe(&filter, self.handler.clone())
                    .await?;
                debug!(filter = %filter, "Subscribed");
                Ok::<(), Error>(())
            })
            .await?;
        }
        Ok(())
    }
}

/// Removes a pending entry when its write finishes or is dropped.
struct PendingGuard {
    pending: PendingTable,
    key: WriteKey,
    seq: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if pending.get(&self.key).is_some_and(|p| p.seq == self.seq) {
            pending.remove(&self.key);
        }
    }
}

/// Route an inbound message to the writes waiting on it.
fn dispatch(pending: &Mutex<HashMap<WriteKey, PendingWrite>>, message: &Message) {
    let inbound = match topic::classify(&message.topic) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(topic = %message.topic, error = %e, "Dropping message with malformed topic");
            return;
        }
    };

    match inbound {
        InboundTopic::Output(address) => {
            let value = parse_payload(&message.payload);
            resolve_address(pending, &address, || Ok(value.clone()));
        }
        InboundTopic::Error(address) => {
            let reason = device_error_message(&message.payload);
            warn!(resource = %address, error = %reason, "Device reported error");
            resolve_address(pending, &address, || Err(Error::Device(reason.clone())));
        }
        InboundTopic::Response(client_id) => {
            let envelope: ResponseEnvelope = match serde_json::from_slice(&message.payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(topic = %message.topic, error = %e, "Dropping malformed response");
                    return;
                }
            };
            let address = match topic::decompose_resource_topic(&envelope.topic) {
                Ok(address) => address,
                Err(e) => {
                    warn!(
                        topic = %message.topic,
                        error = %e,
                        "Dropping response for malformed topic"
                    );
                    return;
                }
            };

            let result = match envelope.error {
                Some(reason) => Err(Error::Device(reason)),
                None => Ok(envelope.data.unwrap_or(Value::Null)),
            };
            let entry = pending.lock().remove(&WriteKey::new(client_id, address));
            if let Some(entry) = entry {
                let _ = entry.tx.send(result);
            }
        }
    }
}

/// Resolve every write to `address`, whichever client issued it.
fn resolve_address<F>(
    pending: &Mutex<HashMap<WriteKey, PendingWrite>>,
    address: &ResourceAddress,
    result: F,
) where
    F: Fn() -> Result<Value>,
{
    let resolved: Vec<PendingWrite> = {
        let mut pending = pending.lock();
        let keys: Vec<WriteKey> = pending
            .keys()
            .filter(|key| key.address == *address)
            .cloned()
            .collect();
        keys.iter().filter_map(|key| pending.remove(key)).collect()
    };

    for entry in resolved {
        let _ = entry.tx.send(result());
    }
}

/// Output payloads are JSON when they parse, raw text otherwise.
fn parse_payload(payload: &[u8]) -> Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}

fn device_error_message(payload: &[u8]) -> String {
    match parse_payload(payload) {
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => Value::Object(fields).to_string(),
        },
        Value::String(text) => text,
        other => other.to_string(),
    }
}
