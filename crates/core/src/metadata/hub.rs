//! In-process metadata hub sink.
//!
//! A thin wrapper over the sink's own queue for consumers living in the
//! same process (e.g. a future embedding crate) that want metadata events
//! without going through a pipe or socket.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::MetadataPackage;
use crate::queue::BoundedQueue;

pub struct HubSink {
    queue: Arc<BoundedQueue<MetadataPackage>>,
}

impl HubSink {
    pub fn new(queue: Arc<BoundedQueue<MetadataPackage>>) -> Self {
        Self { queue }
    }

    pub fn recv(&self, stop: &AtomicBool) -> Option<MetadataPackage> {
        self.queue.dequeue(stop)
    }
}
