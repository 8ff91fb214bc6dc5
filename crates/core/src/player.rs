//! Player collaborator interface.
//!
//! Audio decode, mixing, clock sync, and output device management are all
//! explicit Non-goals — this trait is the seam the dispatcher calls
//! through for the four operations the RTSP surface needs.

pub trait Player: Send + Sync {
    fn player_play(&self);
    fn player_stop(&self);
    /// Discard buffered audio up to (and not including) `rtptime`, or all
    /// of it if `rtptime` is `None`.
    fn player_flush(&self, rtptime: Option<u32>);
    /// Set output volume, in dB.
    fn player_volume(&self, db: f64);
    /// Whether the player is currently started, for RECORD's "if no player
    /// is running, start it" check.
    fn is_running(&self) -> bool;
}

/// No-op [`Player`] used where a real audio pipeline is not wired in.
#[derive(Debug, Default)]
pub struct NullPlayer {
    running: std::sync::atomic::AtomicBool,
}

impl Player for NullPlayer {
    fn player_play(&self) {
        self.running
            .store(true, std::sync::atomic::Ordering::Relaxed);
    }

    fn player_stop(&self) {
        self.running
            .store(false, std::sync::atomic::Ordering::Relaxed);
    }

    fn player_flush(&self, _rtptime: Option<u32>) {}

    fn player_volume(&self, _db: f64) {}

    fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::Relaxed)
    }
}
