//! Resource write protocol against the in-process transport.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use cblocks_commands::{ResourceWriteProtocol, ResourceWriteUseCase};
use cblocks_core::error::Error;
use cblocks_core::resource::{CBlock, Instance, Resource, ResourceAddress, Schema, SchemaType};
use async_trait::async_trait;
use cblocks_core::transport::{MemoryTransport, Message, MessageHandler, PubSub, SubscriptionId};
use cblocks_storage::RegistryStore;
use serde_json::{json, Value};

const CLIENT: &str = "client-1";
const LED_COLOUR: ResourceAddress = ResourceAddress {
    object_id: 3304,
    instance_id: 1,
    resource_id: 1,
};

fn registry() -> RegistryStore {
    let channel = Schema {
        minimum: Some(0.0),
        maximum: Some(255.0),
        ..Schema::of(SchemaType::Integer)
    };
    let led = CBlock {
        object_id: 3304,
        name: "LED".to_string(),
        resources: BTreeMap::from([(
            1,
            Resource {
                resource_id: 1,
                name: "Colour".to_string(),
                is_writeable: true,
                unit: String::new(),
                schema: Schema::of(SchemaType::Object)
                    .with_property("red", channel.clone())
                    .with_property("green", channel.clone())
                    .with_property("blue", channel),
            },
        )]),
        instances: BTreeMap::from([(1, Instance::default())]),
    };
    let temperature = CBlock {
        object_id: 3303,
        name: "Temperature Sensor".to_string(),
        resources: BTreeMap::from([(
            0,
            Resource {
                resource_id: 0,
                name: "Current Temperature".to_string(),
                is_writeable: false,
                unit: "°C".to_string(),
                schema: Schema::number(0.0, 100.0),
            },
        )]),
        instances: BTreeMap::from([(0, Instance::default())]),
    };

    let store = RegistryStore::memory().unwrap();
    store.update_object(&led).unwrap();
    store.update_object(&temperature).unwrap();
    store
}

struct Harness {
    transport: Arc<MemoryTransport>,
    protocol: Arc<ResourceWriteProtocol>,
    writes: ResourceWriteUseCase,
}

fn harness(timeout: Duration) -> Harness {
    let transport = Arc::new(MemoryTransport::new());
    let protocol = Arc::new(ResourceWriteProtocol::new(transport.clone(), timeout));
    let writes = ResourceWriteUseCase::new(Arc::new(registry()), protocol.clone());
    Harness {
        transport,
        protocol,
        writes,
    }
}

/// Simulated device: answers every input on `filter` by publishing `reply`
/// for the written payload.
async fn attach_device<F>(transport: &Arc<MemoryTransport>, filter: &str, reply: F)
where
    F: Fn(&Message) -> (String, Vec<u8>) + Send + Sync + 'static,
{
    let device: Weak<MemoryTransport> = Arc::downgrade(transport);
    transport
        .subscribe(
            filter,
            Arc::new(move |message: &Message| {
                if let Some(transport) = device.upgrade() {
                    let (topic, payload) = reply(message);
                    transport.deliver(&topic, payload);
                }
            }),
        )
        .await
        .unwrap();
}

async fn wait_until_pending(protocol: &ResourceWriteProtocol) {
    for _ in 0..100 {
        if protocol.pending_count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("write never became pending");
}

#[tokio::test]
async fn test_non_writeable_resource_is_never_published() {
    let h = harness(Duration::from_millis(100));

    let err = h
        .writes
        .write(CLIENT, 3303, 0, 0, json!(21.5))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(h.transport.publish_count(), 0);
}

#[tokio::test]
async fn test_schema_violation_is_never_published() {
    let h = harness(Duration::from_millis(100));

    let err = h
        .writes
        .write(CLIENT, 3304, 1, 1, json!({"red": 300, "green": 0, "blue": 0}))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(h.transport.publish_count(), 0);
}

#[tokio::test]
async fn test_unknown_resource() {
    let h = harness(Duration::from_millis(100));

    let err = h
        .writes
        .write(CLIENT, 3304, 9, 1, json!({"red": 0, "green": 0, "blue": 0}))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(h.transport.publish_count(), 0);
}

#[tokio::test]
async fn test_confirmed_via_output_topic() {
    let h = harness(Duration::from_secs(1));
    attach_device(&h.transport, "+/3304/1/1/input", |message| {
        ("3304/1/1/output".to_string(), message.payload.clone())
    })
    .await;

    let colour = json!({"red": 255, "green": 0, "blue": 0});
    let confirmed = h
        .writes
        .write(CLIENT, 3304, 1, 1, colour.clone())
        .await
        .unwrap();

    assert_eq!(confirmed, colour);
    let published = h.transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "client-1/3304/1/1/input");
    assert_eq!(
        serde_json::from_slice::<Value>(&published[0].payload).unwrap(),
        colour
    );
    assert_eq!(h.protocol.pending_count(), 0);
}

#[tokio::test]
async fn test_confirmed_via_response_topic() {
    let h = harness(Duration::from_secs(1));
    attach_device(&h.transport, "+/3304/1/1/input", |message| {
        let client_id = message.topic.split('/').next().unwrap_or_default();
        let data: Value = serde_json::from_slice(&message.payload).unwrap();
        let envelope = json!({"topic": "3304/1/1/output", "data": data});
        (
            format!("{}/responses", client_id),
            serde_json::to_vec(&envelope).unwrap(),
        )
    })
    .await;

    let colour = json!({"red": 0, "green": 0, "blue": 255});
    let confirmed = h.writes.write(CLIENT, 3304, 1, 1, colour.clone()).await.unwrap();
    assert_eq!(confirmed, colour);
}

#[tokio::test]
async fn test_response_for_other_client_is_ignored() {
    let h = harness(Duration::from_millis(100));
    attach_device(&h.transport, "+/3304/1/1/input", |_message| {
        let envelope = json!({"topic": "3304/1/1/output", "data": 1});
        ("someone-else/responses".to_string(), serde_json::to_vec(&envelope).unwrap())
    })
    .await;

    let err = h
        .writes
        .write(CLIENT, 3304, 1, 1, json!({"red": 0, "green": 0, "blue": 0}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(100)));
}

#[tokio::test]
async fn test_device_error() {
    let h = harness(Duration::from_secs(1));
    attach_device(&h.transport, "+/3304/1/1/input", |_message| {
        (
            "3304/1/1/output/errors".to_string(),
            br#"{"message": "LED driver fault"}"#.to_vec(),
        )
    })
    .await;

    let err = h
        .writes
        .write(CLIENT, 3304, 1, 1, json!({"red": 0, "green": 0, "blue": 0}))
        .await
        .unwrap_err();

    match err {
        Error::Device(message) => assert_eq!(message, "LED driver fault"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.protocol.pending_count(), 0);
}

#[tokio::test]
async fn test_device_error_via_response_topic() {
    let h = harness(Duration::from_secs(1));
    attach_device(&h.transport, "+/3304/1/1/input", |message| {
        let client_id = message.topic.split('/').next().unwrap_or_default();
        let envelope = json!({"topic": "3304/1/1/output", "error": "Colour out of gamut"});
        (
            format!("{}/responses", client_id),
            serde_json::to_vec(&envelope).unwrap(),
        )
    })
    .await;

    let err = h
        .writes
        .write(CLIENT, 3304, 1, 1, json!({"red": 0, "green": 255, "blue": 0}))
        .await
        .unwrap_err();

    match err {
        Error::Device(message) => assert_eq!(message, "Colour out of gamut"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.protocol.pending_count(), 0);
}

#[tokio::test]
async fn test_timeout_releases_pending_write() {
    let h = harness(Duration::from_millis(50));
    let colour = json!({"red": 1, "green": 2, "blue": 3});

    let err = h
        .writes
        .write(CLIENT, 3304, 1, 1, colour.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(50)));
    assert_eq!(h.protocol.pending_count(), 0);
    let subscriptions = h.transport.subscription_count();

    // Accepted again rather than rejected as busy.
    let err = h.writes.write(CLIENT, 3304, 1, 1, colour).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(50)));
    assert_eq!(h.transport.publish_count(), 2);
    assert_eq!(h.transport.subscription_count(), subscriptions);
}

#[tokio::test]
async fn test_second_write_to_same_key_is_busy() {
    let h = harness(Duration::from_secs(2));
    let colour = json!({"red": 9, "green": 9, "blue": 9});

    let protocol = h.protocol.clone();
    let first_colour = colour.clone();
    let first =
        tokio::spawn(async move { protocol.write(CLIENT, LED_COLOUR, &first_colour).await });
    wait_until_pending(&h.protocol).await;

    let err = h
        .writes
        .write(CLIENT, 3304, 1, 1, colour.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Busy(_)));
    assert_eq!(err.status_code(), 409);

    // Another client is not blocked by the pending write.
    assert!(!h.protocol.is_pending("client-2", &LED_COLOUR));

    h.transport
        .deliver("3304/1/1/output", serde_json::to_vec(&colour).unwrap());
    assert_eq!(first.await.unwrap().unwrap(), colour);
    assert_eq!(h.transport.publish_count(), 1);
}

#[tokio::test]
async fn test_cancelled_write_removes_pending_entry() {
    let h = harness(Duration::from_secs(5));

    let protocol = h.protocol.clone();
    let task = tokio::spawn(async move {
        protocol
            .write(CLIENT, LED_COLOUR, &json!({"red": 0, "green": 0, "blue": 0}))
            .await
    });
    wait_until_pending(&h.protocol).await;

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(h.protocol.pending_count(), 0);
    assert!(!h.protocol.is_pending(CLIENT, &LED_COLOUR));
}

#[tokio::test]
async fn test_malformed_topics_do_not_disturb_pending_writes() {
    let h = harness(Duration::from_secs(2));
    let colour = json!({"red": 5, "green": 5, "blue": 5});

    let protocol = h.protocol.clone();
    let expected = colour.clone();
    let write = tokio::spawn(async move { protocol.write(CLIENT, LED_COLOUR, &expected).await });
    wait_until_pending(&h.protocol).await;

    // Response envelope naming a topic that cannot be decomposed.
    h.transport.deliver(
        "client-1/responses",
        serde_json::to_vec(&json!({"topic": "bogus", "data": 1})).unwrap(),
    );
    // Response that is not an envelope at all.
    h.transport.deliver("client-1/responses", "not json");
    assert_eq!(h.protocol.pending_count(), 1);

    h.transport
        .deliver("3304/1/1/output", serde_json::to_vec(&colour).unwrap());
    assert_eq!(write.await.unwrap().unwrap(), colour);
}

/// Transport whose broker acknowledges subscriptions slowly.
struct SlowSubscribe {
    inner: Arc<MemoryTransport>,
    delay: Duration,
}

#[async_trait]
impl PubSub for SlowSubscribe {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> cblocks_core::Result<()> {
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: MessageHandler,
    ) -> cblocks_core::Result<SubscriptionId> {
        tokio::time::sleep(self.delay).await;
        self.inner.subscribe(filter, handler).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> cblocks_core::Result<()> {
        self.inner.unsubscribe(id).await
    }
}

#[tokio::test]
async fn test_concurrent_writes_wait_for_shared_subscription() {
    let transport = Arc::new(MemoryTransport::new());
    let slow = Arc::new(SlowSubscribe {
        inner: transport.clone(),
        delay: Duration::from_millis(50),
    });
    let protocol = Arc::new(ResourceWriteProtocol::new(slow, Duration::from_millis(500)));

    // Answers every input on the client's response topic.
    attach_device(&transport, "+/+/+/+/input", |message| {
        let segments: Vec<&str> = message.topic.split('/').collect();
        let envelope = json!({
            "topic": format!("{}/{}/{}/output", segments[1], segments[2], segments[3]),
            "data": "ok",
        });
        (
            format!("{}/responses", segments[0]),
            serde_json::to_vec(&envelope).unwrap(),
        )
    })
    .await;

    let first = {
        let protocol = protocol.clone();
        tokio::spawn(async move { protocol.write(CLIENT, LED_COLOUR, &json!(1)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = protocol
        .write(CLIENT, ResourceAddress::new(3303, 0, 5), &json!(2))
        .await;

    assert_eq!(second.unwrap(), json!("ok"));
    assert_eq!(first.await.unwrap().unwrap(), json!("ok"));
    // Device input, output and errors per address, one shared response topic.
    assert_eq!(transport.subscription_count(), 1 + 2 + 2 + 1);
}
