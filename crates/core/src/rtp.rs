//! RTP subsystem collaborator interface.
//!
//! Allocating and tearing down the audio/control/timing UDP ports, and
//! moving RTP packets once a session is playing, is out of scope here —
//! this trait is the seam the dispatcher calls through.

use crate::error::Result;

/// Local UDP ports allocated for one connection's RTP session.
#[derive(Debug, Clone, Copy)]
pub struct RtpPorts {
    pub audio: u16,
    pub control: u16,
    pub timing: u16,
}

/// External RTP transport collaborator.
pub trait RtpEndpoint: Send + Sync {
    /// Allocate local ports and register the sender's remote control/timing
    /// ports for one connection.
    fn rtp_setup(&self, remote_control_port: u16, remote_timing_port: u16) -> Result<RtpPorts>;

    /// Bring up the RTP receive path once ports are known.
    fn rtp_initialise(&self) -> Result<()>;

    /// Tear down the RTP receive path on connection exit.
    fn rtp_terminate(&self);
}

/// No-op [`RtpEndpoint`] used where a real RTP transport is not wired in
/// (tests, or a CLI run with `--no-rtp` for protocol-only exercising).
#[derive(Debug, Default)]
pub struct NullRtpEndpoint;

impl RtpEndpoint for NullRtpEndpoint {
    fn rtp_setup(&self, _remote_control_port: u16, _remote_timing_port: u16) -> Result<RtpPorts> {
        Ok(RtpPorts {
            audio: 6000,
            control: 6001,
            timing: 6002,
        })
    }

    fn rtp_initialise(&self) -> Result<()> {
        Ok(())
    }

    fn rtp_terminate(&self) {}
}
