//! Session slot and connection registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, RtspError};

struct SlotHolder {
    connection_id: u64,
    stop: Arc<AtomicBool>,
}

/// The process-wide single "playing connection" slot.
///
/// At most one connection holds the slot; holding it is a precondition for
/// SETUP/RECORD/FLUSH/TEARDOWN.
pub struct SessionSlot {
    holder: Mutex<Option<SlotHolder>>,
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSlot {
    pub fn new() -> Self {
        Self {
            holder: Mutex::new(None),
        }
    }

    /// Which connection currently holds the slot, if any.
    pub fn holder(&self) -> Option<u64> {
        self.holder.lock().as_ref().map(|h| h.connection_id)
    }

    pub fn is_held_by(&self, connection_id: u64) -> bool {
        self.holder() == Some(connection_id)
    }

    /// Acquire the slot for `connection_id` on ANNOUNCE:
    ///
    /// 1. Empty — assume it immediately.
    /// 2. Held by the caller — tolerate (log and succeed).
    /// 3. Held, holder's `stop` already set (its own watchdog is already
    ///    shutting it down) — wait for release regardless of
    ///    `allow_interruption`.
    /// 4. Held, `allow_interruption` true — cancel the holder and wait.
    /// 5. Held, `allow_interruption` false, holder not stopping — fail with
    ///    [`RtspError::SessionConflict`] (453).
    ///
    /// Waiting polls for up to 3s at 100ms intervals; timeout fails the
    /// same way as case 5.
    pub fn acquire(
        &self,
        connection_id: u64,
        stop: Arc<AtomicBool>,
        allow_interruption: bool,
    ) -> Result<()> {
        {
            let mut guard = self.holder.lock();
            match guard.as_ref() {
                None => {
                    *guard = Some(SlotHolder {
                        connection_id,
                        stop,
                    });
                    return Ok(());
                }
                Some(h) if h.connection_id == connection_id => {
                    tracing::warn!(connection_id, "duplicate ANNOUNCE on a connection already holding the session slot");
                    return Ok(());
                }
                Some(h) if h.stop.load(Ordering::Relaxed) => {
                    tracing::debug!(connection_id, holder = h.connection_id, "ANNOUNCE waiting for holder already shutting down");
                }
                Some(h) if allow_interruption => {
                    tracing::debug!(connection_id, holder = h.connection_id, "ANNOUNCE interrupting current session holder");
                    h.stop.store(true, Ordering::Relaxed);
                }
                Some(_) => {
                    return Err(RtspError::SessionConflict);
                }
            }
        }

        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            std::thread::sleep(Duration::from_millis(100));
            let mut guard = self.holder.lock();
            if guard.is_none() {
                *guard = Some(SlotHolder {
                    connection_id,
                    stop,
                });
                return Ok(());
            }
            drop(guard);
            if Instant::now() >= deadline {
                return Err(RtspError::SessionConflict);
            }
        }
    }

    /// Unconditionally clear the slot iff `connection_id` still holds it.
    pub fn release(&self, connection_id: u64) {
        let mut guard = self.holder.lock();
        if guard.as_ref().map(|h| h.connection_id) == Some(connection_id) {
            *guard = None;
        }
    }
}

/// One tracked connection task, as seen by the listener's reaper.
pub struct ConnectionEntry {
    pub connection_id: u64,
    /// Set by the watchdog or the listener to request the connection's main
    /// loop exit at its next suspension point.
    pub stop: Arc<AtomicBool>,
    /// Cleared by the connection's main loop just before it exits.
    pub running: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionEntry {
    pub fn new(connection_id: u64, stop: Arc<AtomicBool>, running: Arc<AtomicBool>) -> Self {
        Self {
            connection_id,
            stop,
            running,
            join: Mutex::new(None),
        }
    }

    pub fn set_join_handle(&self, handle: JoinHandle<()>) {
        *self.join.lock() = Some(handle);
    }
}

/// Append-only registry of live connections, used by the listener to batch
/// cancel and reap.
pub struct ConnectionRegistry {
    entries: RwLock<Vec<Arc<ConnectionEntry>>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn push(&self, entry: Arc<ConnectionEntry>) {
        self.entries.write().push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and join every entry whose task has marked itself not-running.
    pub fn reap(&self) {
        let finished: Vec<Arc<ConnectionEntry>> = {
            let mut entries = self.entries.write();
            let mut finished = Vec::new();
            entries.retain(|entry| {
                if entry.running.load(Ordering::Relaxed) {
                    true
                } else {
                    finished.push(entry.clone());
                    false
                }
            });
            finished
        };
        for entry in finished {
            if let Some(handle) = entry.join.lock().take() {
                let _ = handle.join();
            }
        }
    }

    /// Request every tracked connection to stop, for listener cleanup.
    pub fn cancel_all(&self) {
        for entry in self.entries.read().iter() {
            entry.stop.store(true, Ordering::Relaxed);
        }
    }

    /// Join every tracked task, draining the registry. Called after
    /// [`Self::cancel_all`] during listener shutdown.
    pub fn join_all(&self) {
        let drained: Vec<Arc<ConnectionEntry>> = self.entries.write().drain(..).collect();
        for entry in drained {
            if let Some(handle) = entry.join.lock().take() {
                let _ = handle.join();
            }
        }
    }
}
