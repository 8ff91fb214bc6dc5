//! Metadata fan-out.
//!
//! Four independent sinks — pipe, UDP multicast, an in-process hub, and
//! MQTT — each fed by its own 500-entry bounded queue. [`MetadataHub`] is
//! the `send_metadata` emit point: it clones one [`MetadataPackage`]
//! into every enabled sink's queue.

pub mod hub;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod multicast;
pub mod pipe;

use std::sync::Arc;

use crate::message::Message;
use crate::queue::BoundedQueue;

/// Per-sink queue depth.
pub const SINK_QUEUE_CAPACITY: usize = 500;

/// Either an owned copy of the event payload, a retained clone of the
/// originating [`Message`], or nothing — exactly one of a data copy or a
/// carrier message is ever set.
///
/// A [`Message`] clone *is* the retain; the last sink to drop its clone
/// performs the release, so there is no separate release call to make.
#[derive(Debug, Clone)]
pub enum MetadataPayload {
    Owned(Vec<u8>),
    Carried(Message),
    Empty,
}

/// One metadata event.
#[derive(Debug, Clone)]
pub struct MetadataPackage {
    pub type_tag: [u8; 4],
    pub code_tag: [u8; 4],
    pub payload: MetadataPayload,
}

impl MetadataPackage {
    pub fn from_bytes(type_tag: [u8; 4], code_tag: [u8; 4], data: Option<&[u8]>) -> Self {
        let payload = match data {
            Some(bytes) if !bytes.is_empty() => MetadataPayload::Owned(bytes.to_vec()),
            _ => MetadataPayload::Empty,
        };
        Self {
            type_tag,
            code_tag,
            payload,
        }
    }

    pub fn from_carrier(type_tag: [u8; 4], code_tag: [u8; 4], carrier: Message) -> Self {
        Self {
            type_tag,
            code_tag,
            payload: MetadataPayload::Carried(carrier),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.payload {
            MetadataPayload::Owned(data) => data,
            MetadataPayload::Carried(message) => message.body().unwrap_or(&[]),
            MetadataPayload::Empty => &[],
        }
    }
}

/// One registered sink's queue.
pub struct Sink {
    pub name: &'static str,
    queue: Arc<BoundedQueue<MetadataPackage>>,
}

impl Sink {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            queue: Arc::new(BoundedQueue::new(SINK_QUEUE_CAPACITY, name)),
        }
    }

    pub fn queue(&self) -> Arc<BoundedQueue<MetadataPackage>> {
        self.queue.clone()
    }
}

/// Fans a [`MetadataPackage`] out to every enabled sink.
#[derive(Default)]
pub struct MetadataHub {
    sinks: Vec<Sink>,
}

impl MetadataHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Sink) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sinks(&self) -> &[Sink] {
        &self.sinks
    }

    /// Emit one event. `block` selects blocking vs non-blocking lock
    /// acquisition per sink queue; either way a full queue drops the item
    /// rather than stalling the emitting thread.
    pub fn send(&self, package: MetadataPackage, block: bool) {
        for sink in &self.sinks {
            sink.queue.enqueue(package.clone(), block);
        }
    }
}
