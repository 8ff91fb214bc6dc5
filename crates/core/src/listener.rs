//! Dual-stack TCP listener and accept loop.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::Config;
use crate::connection;
use crate::error::{Result, RtspError};
use crate::mdns::MdnsAdvertiser;
use crate::metadata::MetadataHub;
use crate::protocol::dispatch::Dispatcher;
use crate::registry::{ConnectionEntry, ConnectionRegistry};

/// `SO_SNDTIMEO` applied to every bound listen socket.
const LISTEN_SEND_TIMEOUT: Duration = Duration::from_secs(3);
/// Poll interval for the non-blocking accept loop; stands in for a longer
/// `select` deadline while staying responsive to shutdown.
const ACCEPT_POLL: Duration = Duration::from_millis(200);
const LISTEN_BACKLOG: i32 = 5;

/// Owns the bound listen sockets and the connection registry; accepts
/// connections and hands them to [`connection::spawn`].
pub struct Listener {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    metadata: Arc<MetadataHub>,
    mdns: Arc<dyn MdnsAdvertiser>,
    registry: Arc<ConnectionRegistry>,
    next_connection_id: AtomicU64,
}

impl Listener {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Arc<Dispatcher>,
        metadata: Arc<MetadataHub>,
        mdns: Arc<dyn MdnsAdvertiser>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            metadata,
            mdns,
            registry: Arc::new(ConnectionRegistry::new()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Bind and `listen()` the v4 and v6 sockets. A family that fails
    /// to bind (commonly v6 on a v4-only host) is skipped rather than
    /// failing the whole listener, as long as at least one succeeds.
    fn bind(&self) -> Result<Vec<TcpListener>> {
        let mut listeners = Vec::new();
        for (domain, addr) in [
            (Domain::IPV4, format!("0.0.0.0:{}", self.config.port)),
            (Domain::IPV6, format!("[::]:{}", self.config.port)),
        ] {
            // socket2 requests SOCK_CLOEXEC under the hood on platforms that
            // support it, satisfying FD_CLOEXEC without a separate call.
            let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
            socket.set_reuse_address(true)?;
            socket.set_write_timeout(Some(LISTEN_SEND_TIMEOUT))?;
            if self.config.timeout > 0 {
                socket.set_read_timeout(Some(Duration::from_secs(self.config.timeout)))?;
            }
            if domain == Domain::IPV6 {
                socket.set_only_v6(true)?;
            }

            let sock_addr: SocketAddr = addr.parse().expect("literal listen address");
            if let Err(err) = socket.bind(&sock_addr.into()) {
                tracing::warn!(%addr, %err, "failed to bind listen socket, skipping address family");
                continue;
            }
            socket.listen(LISTEN_BACKLOG)?;
            socket.set_nonblocking(true)?;
            listeners.push(socket.into());
        }

        if listeners.is_empty() {
            return Err(RtspError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no listen socket could be bound for either address family",
            )));
        }
        Ok(listeners)
    }

    /// Bind, accept connections until `stop` is set, then cancel and join
    /// every tracked connection and unregister mDNS.
    pub fn run(self: Arc<Self>, stop: Arc<AtomicBool>) -> Result<()> {
        let listeners = self.bind()?;
        self.mdns.mdns_register(self.config.port);
        tracing::info!(port = self.config.port, sockets = listeners.len(), "listening");

        let accept_threads: Vec<_> = listeners
            .into_iter()
            .map(|listener| {
                let this = self.clone();
                let stop = stop.clone();
                thread::spawn(move || this.accept_loop(listener, stop))
            })
            .collect();

        while !stop.load(Ordering::Relaxed) {
            self.registry.reap();
            thread::sleep(ACCEPT_POLL);
        }

        for handle in accept_threads {
            let _ = handle.join();
        }

        self.registry.cancel_all();
        self.registry.join_all();
        self.mdns.mdns_unregister();
        Ok(())
    }

    fn accept_loop(&self, listener: TcpListener, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, peer_addr)) => {
                    self.registry.reap();
                    if let Err(err) = stream.set_nonblocking(false) {
                        tracing::warn!(%peer_addr, %err, "failed to clear non-blocking mode on accepted socket");
                        continue;
                    }
                    self.spawn_connection(stream, peer_addr);
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(err) => {
                    tracing::warn!(%err, "accept error");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(connection_id, %peer_addr, "accepted connection");
        match connection::spawn(
            stream,
            connection_id,
            self.config.clone(),
            self.dispatcher.clone(),
            self.metadata.clone(),
        ) {
            Ok((shared, handle)) => {
                let entry = Arc::new(ConnectionEntry::new(
                    connection_id,
                    shared.stop.clone(),
                    shared.running.clone(),
                ));
                entry.set_join_handle(handle);
                self.registry.push(entry);
            }
            Err(err) => tracing::warn!(connection_id, %err, "failed to spawn connection task"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;
    use crate::mdns::NullMdnsAdvertiser;
    use crate::metadata::MetadataHub;
    use crate::player::NullPlayer;
    use crate::registry::SessionSlot;
    use crate::rtp::NullRtpEndpoint;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::RsaPrivateKey;
    use std::io::{Read, Write};

    fn test_listener(port: u16) -> Listener {
        let mut rng = rand::rng();
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let pem = key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap().to_string();
        let crypto = Arc::new(DefaultCryptoProvider::from_pkcs1_pem(&pem).unwrap());

        let config = Arc::new(Config {
            port,
            ..Config::default()
        });
        let dispatcher = Arc::new(Dispatcher::new(
            config.clone(),
            Arc::new(SessionSlot::new()),
            crypto,
            Arc::new(NullPlayer::default()),
            Arc::new(NullRtpEndpoint),
            Arc::new(MetadataHub::new()),
        ));
        Listener::new(config, dispatcher, Arc::new(MetadataHub::new()), Arc::new(NullMdnsAdvertiser))
    }

    #[test]
    fn bind_on_ephemeral_port_yields_at_least_one_listener() {
        let listener = test_listener(0);
        let bound = listener.bind().unwrap();
        assert!(!bound.is_empty());
    }

    #[test]
    fn accepted_connection_is_served_and_registered() {
        let listener = Arc::new(test_listener(0));
        let bound = listener.bind().unwrap();
        let addr = bound[0].local_addr().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let accept_listener = listener.clone();
        let accept_stop = stop.clone();
        let accept_thread = thread::spawn(move || accept_listener.accept_loop(bound.into_iter().next().unwrap(), accept_stop));

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        stream.write_all(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n").unwrap();

        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);
        assert!(response.starts_with("RTSP/1.0 200 OK"));

        assert_eq!(listener.registry().len(), 1);

        stop.store(true, Ordering::Relaxed);
        drop(stream);
        accept_thread.join().unwrap();
        listener.registry().cancel_all();
        listener.registry().join_all();
    }
}
