//! Per-connection state, connection lifecycle, and watchdog.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, RtspError};
use crate::metadata::{MetadataHub, MetadataPackage};
use crate::protocol::dispatch::Dispatcher;
use crate::protocol::frame::read_message;
use crate::protocol::response::{canned_bad_request, RtspResponse};
use crate::protocol::sdp::StreamDescriptor;
use crate::rtp::RtpPorts;

/// One retry with this backoff on a read/channel-closed error while the
/// player is still running.
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(20);
/// Watchdog tick interval.
const WATCHDOG_TICK: Duration = Duration::from_secs(2);
/// Bark count at which `cmd_unfixable` fires, once.
const UNFIXABLE_BARK_THRESHOLD: u32 = 3;

struct WatchdogState {
    last_bark: Instant,
    barks: u32,
    unfixable_invoked: bool,
}

/// State shared between a connection's main task and its watchdog task.
pub struct ConnectionShared {
    pub connection_id: u64,
    pub stop: Arc<AtomicBool>,
    pub running: Arc<AtomicBool>,
    watchdog: Mutex<WatchdogState>,
}

impl ConnectionShared {
    pub fn new(connection_id: u64) -> Arc<Self> {
        Arc::new(Self {
            connection_id,
            stop: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(true)),
            watchdog: Mutex::new(WatchdogState {
                last_bark: Instant::now(),
                barks: 0,
                unfixable_invoked: false,
            }),
        })
    }

    /// Reset the watchdog clock after a full request arrives — the closest
    /// proxy this framing layer has to "bytes were received".
    fn reset_bark_clock(&self) {
        self.watchdog.lock().last_bark = Instant::now();
    }
}

/// Per-connection state the dispatcher reads and mutates. Owned
/// exclusively by the connection's main thread — nothing here is shared
/// with the watchdog, which only touches [`ConnectionShared`].
pub struct ConnectionState {
    pub shared: Arc<ConnectionShared>,
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub authorized: bool,
    pub nonce: Option<String>,
    pub active_remote: Option<String>,
    pub dacp_id: Option<String>,
    pub user_agent: Option<String>,
    pub airplay_version: Option<u32>,
    pub rtp_ports: Option<RtpPorts>,
    pub remote_control_port: Option<u16>,
    pub remote_timing_port: Option<u16>,
    pub rtp_running: bool,
    pub stream: StreamDescriptor,
    pub min_latency: Option<u32>,
    pub max_latency: Option<u32>,
    /// Set once this connection's RECORD started the player, so TEARDOWN
    /// and connection-exit cleanup know whether to emit `pend`.
    pub player_owned: bool,
}

impl ConnectionState {
    pub fn new(shared: Arc<ConnectionShared>, peer_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            shared,
            peer_addr,
            local_addr,
            authorized: false,
            nonce: None,
            active_remote: None,
            dacp_id: None,
            user_agent: None,
            airplay_version: None,
            rtp_ports: None,
            remote_control_port: None,
            remote_timing_port: None,
            rtp_running: false,
            stream: StreamDescriptor::default(),
            min_latency: None,
            max_latency: None,
            player_owned: false,
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.shared.connection_id
    }
}

/// Spawn the per-connection main task and its watchdog. Returns the
/// shared handle the listener's [`crate::registry::ConnectionRegistry`]
/// tracks for cancellation and reaping.
pub fn spawn(
    stream: TcpStream,
    connection_id: u64,
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    metadata: Arc<MetadataHub>,
) -> Result<(Arc<ConnectionShared>, std::thread::JoinHandle<()>)> {
    let peer_addr = stream.peer_addr()?;
    let local_addr = stream.local_addr()?;
    stream.set_read_timeout(Some(Duration::from_secs(config.timeout.max(1))))?;

    let shared = ConnectionShared::new(connection_id);
    let shared_for_thread = shared.clone();

    let handle = std::thread::Builder::new()
        .name(format!("raop-conn-{connection_id}"))
        .spawn(move || run(stream, peer_addr, local_addr, shared_for_thread, config, dispatcher, metadata))
        .map_err(RtspError::Io)?;

    Ok((shared, handle))
}

fn run(
    stream: TcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    shared: Arc<ConnectionShared>,
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    metadata: Arc<MetadataHub>,
) {
    let watchdog_shared = shared.clone();
    let watchdog_config = config.clone();
    let watchdog_handle = std::thread::Builder::new()
        .name(format!("raop-watchdog-{}", shared.connection_id))
        .spawn(move || run_watchdog(watchdog_shared, watchdog_config))
        .expect("spawn watchdog thread");

    let mut conn = ConnectionState::new(shared.clone(), peer_addr, local_addr);
    let mut read_stream = stream;
    let mut retried = false;

    while !shared.stop.load(Ordering::Relaxed) {
        let stall_metadata = metadata.clone();
        let stop = shared.stop.clone();
        let outcome = read_message(&mut read_stream, &stop, || {
            stall_metadata.send(MetadataPackage::from_bytes(*b"ssnc", *b"stal", None), true);
        });

        match outcome {
            Ok(request) => {
                shared.reset_bark_clock();
                retried = false;
                let response = dispatcher.dispatch(&mut conn, &request);
                if let Err(err) = write_response(&mut read_stream, &response) {
                    tracing::warn!(connection_id = conn.connection_id(), %err, "failed to write response, tearing down");
                    let _ = socket2::SockRef::from(&read_stream)
                        .set_linger(Some(Duration::from_secs(0)));
                    break;
                }
                if request.method.eq_ignore_ascii_case("TEARDOWN") {
                    break;
                }
            }
            Err(RtspError::Shutdown) => break,
            Err(RtspError::ChannelClosed) | Err(RtspError::Io(_)) => {
                if dispatcher.player_running() && !retried {
                    retried = true;
                    std::thread::sleep(READ_RETRY_BACKOFF);
                    continue;
                }
                break;
            }
            Err(RtspError::Parse { kind }) => {
                tracing::warn!(connection_id = conn.connection_id(), ?kind, "malformed request, sending canned 400");
                let _ = read_stream.write_all(&canned_bad_request());
            }
            Err(err) => {
                tracing::warn!(connection_id = conn.connection_id(), %err, "dispatch error, continuing");
            }
        }
    }

    dispatcher.teardown(&mut conn);
    shared.stop.store(true, Ordering::Relaxed);
    shared.running.store(false, Ordering::Relaxed);
    let _ = watchdog_handle.join();
    let _ = read_stream.shutdown(std::net::Shutdown::Both);
}

fn write_response(stream: &mut TcpStream, response: &RtspResponse) -> Result<()> {
    let bytes = response.serialize()?;
    stream.write_all(&bytes)?;
    Ok(())
}

fn run_watchdog(shared: Arc<ConnectionShared>, config: Arc<Config>) {
    let timeout = Duration::from_secs(config.timeout.max(1));
    let watchdog_active = !config.dont_check_timeout && config.timeout != 0;

    // Runs for as long as the connection's main task is alive, independent
    // of `stop` — a bark sets `stop` to cancel the main task, but the main
    // task's teardown takes a moment to unwind, and the watchdog needs to
    // keep ticking through that window to reach the third bark. It is torn
    // down by `run`'s `running.store(false)` + join, not by `stop`.
    while shared.running.load(Ordering::Relaxed) {
        std::thread::sleep(WATCHDOG_TICK);

        if !watchdog_active {
            continue;
        }

        let mut state = shared.watchdog.lock();
        if state.last_bark.elapsed() < timeout {
            continue;
        }
        state.barks += 1;
        let barks = state.barks;
        let should_invoke_unfixable = barks >= UNFIXABLE_BARK_THRESHOLD && !state.unfixable_invoked;
        if should_invoke_unfixable {
            state.unfixable_invoked = true;
        }
        drop(state);

        tracing::warn!(connection_id = shared.connection_id, barks, "watchdog bark: no traffic within timeout");

        shared.stop.store(true, Ordering::Relaxed);
        if should_invoke_unfixable {
            if let Some(cmd) = &config.cmd_unfixable {
                run_unfixable_command(cmd);
            }
        }
    }
}

fn run_unfixable_command(cmd: &str) {
    tracing::error!(cmd, "invoking unfixable-condition command");
    match std::process::Command::new("sh").arg("-c").arg(cmd).status() {
        Ok(status) if !status.success() => {
            tracing::warn!(cmd, ?status, "unfixable command exited non-zero");
        }
        Err(err) => tracing::warn!(cmd, %err, "failed to spawn unfixable command"),
        _ => {}
    }
}
