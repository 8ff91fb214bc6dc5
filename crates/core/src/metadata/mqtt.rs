//! MQTT metadata sink, behind the `mqtt` feature. Publishes a
//! compact `type/code` topic payload per event; the full binary payload
//! stays on the other sinks, matching how this publisher is used
//! downstream (presence/event signalling, not bulk metadata transfer).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{Client, MqttOptions, QoS};

use super::MetadataPackage;
use crate::queue::BoundedQueue;

pub fn run(broker: String, topic: String, queue: Arc<BoundedQueue<MetadataPackage>>, stop: Arc<AtomicBool>) {
    let Some((host, port)) = broker.split_once(':') else {
        tracing::error!(broker, "mqtt broker address must be host:port");
        return;
    };
    let Ok(port) = port.parse::<u16>() else {
        tracing::error!(broker, "mqtt broker port is not a number");
        return;
    };

    let mut options = MqttOptions::new("raop-rtsp-server", host, port);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut connection) = Client::new(options, 16);

    let event_thread = std::thread::spawn(move || {
        for notification in connection.iter() {
            if notification.is_err() {
                break;
            }
        }
    });

    while let Some(package) = queue.dequeue(&stop) {
        let payload = format!(
            "{:x}/{:x}",
            u32::from_be_bytes(package.type_tag),
            u32::from_be_bytes(package.code_tag)
        );
        if let Err(err) = client.publish(&topic, QoS::AtMostOnce, false, payload) {
            tracing::warn!(%err, "mqtt publish failed");
        }
    }

    drop(client);
    let _ = event_thread.join();
}
