//! Top-level server orchestrator — the crate's public embedding API.
//!
//! Owns the listener and metadata sink threads, and brackets their
//! lifetime with `start`/`stop`. Everything domain-specific (collaborators,
//! dispatch, framing) lives behind the types this wires together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::Config;
use crate::crypto::CryptoProvider;
use crate::error::{Result, RtspError};
use crate::listener::Listener;
use crate::mdns::MdnsAdvertiser;
use crate::metadata::{self, MetadataHub, Sink};
use crate::player::Player;
use crate::protocol::dispatch::Dispatcher;
use crate::registry::SessionSlot;
use crate::rtp::RtpEndpoint;

/// External collaborators a [`Server`] is built with — everything outside
/// the RTSP control plane itself.
pub struct Collaborators {
    pub crypto: Arc<dyn CryptoProvider>,
    pub player: Arc<dyn Player>,
    pub rtp: Arc<dyn RtpEndpoint>,
    pub mdns: Arc<dyn MdnsAdvertiser>,
}

/// High-level server orchestrator.
///
/// Owns the listener, the metadata hub, and one thread per enabled
/// metadata sink. `start`/`stop` bracket the listener's accept loop; the
/// hub sink is always registered so an in-process embedder can read
/// metadata without enabling the pipe/multicast/MQTT sinks.
pub struct Server {
    config: Arc<Config>,
    listener: Arc<Listener>,
    metadata: Arc<MetadataHub>,
    stop: Arc<AtomicBool>,
    listener_thread: Option<JoinHandle<()>>,
    sink_threads: Vec<JoinHandle<()>>,
}

impl Server {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let stop = Arc::new(AtomicBool::new(true));
        let mut hub = MetadataHub::new();
        let mut sink_threads = Vec::new();

        if config.metadata_enabled {
            let pipe_sink = Sink::new("pipe");
            let pipe_queue = pipe_sink.queue();
            hub.register(pipe_sink);
            let path = config.metadata_pipename.clone();
            let pipe_stop = stop.clone();
            sink_threads.push(
                std::thread::Builder::new()
                    .name("raop-sink-pipe".to_string())
                    .spawn(move || metadata::pipe::run(path, pipe_queue, pipe_stop))
                    .expect("spawn pipe sink thread"),
            );

            let multicast_sink = Sink::new("multicast");
            let multicast_queue = multicast_sink.queue();
            hub.register(multicast_sink);
            let addr = config.metadata_sockaddr.clone();
            let port = config.metadata_sockport;
            let max_len = config.metadata_sockmsglength;
            let multicast_stop = stop.clone();
            sink_threads.push(
                std::thread::Builder::new()
                    .name("raop-sink-multicast".to_string())
                    .spawn(move || metadata::multicast::run(addr, port, max_len, multicast_queue, multicast_stop))
                    .expect("spawn multicast sink thread"),
            );
        }

        hub.register(Sink::new("hub"));

        #[cfg(feature = "mqtt")]
        if config.mqtt_enabled {
            let mqtt_sink = Sink::new("mqtt");
            let mqtt_queue = mqtt_sink.queue();
            hub.register(mqtt_sink);
            let broker = config.mqtt_broker.clone();
            let topic = config.mqtt_topic.clone();
            let mqtt_stop = stop.clone();
            sink_threads.push(
                std::thread::Builder::new()
                    .name("raop-sink-mqtt".to_string())
                    .spawn(move || metadata::mqtt::run(broker, topic, mqtt_queue, mqtt_stop))
                    .expect("spawn mqtt sink thread"),
            );
        }

        let metadata = Arc::new(hub);
        let dispatcher = Arc::new(Dispatcher::new(
            config.clone(),
            Arc::new(SessionSlot::new()),
            collaborators.crypto,
            collaborators.player,
            collaborators.rtp,
            metadata.clone(),
        ));
        let listener = Arc::new(Listener::new(config.clone(), dispatcher, metadata.clone(), collaborators.mdns));

        Self {
            config,
            listener,
            metadata,
            stop,
            listener_thread: None,
            sink_threads,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.listener_thread.is_some() {
            return Err(RtspError::AlreadyRunning);
        }
        self.stop.store(false, Ordering::Relaxed);

        let listener = self.listener.clone();
        let stop = self.stop.clone();
        let handle = std::thread::Builder::new()
            .name("raop-listener".to_string())
            .spawn(move || {
                if let Err(err) = listener.run(stop) {
                    tracing::error!(%err, "listener exited with an error");
                }
            })
            .map_err(RtspError::Io)?;

        self.listener_thread = Some(handle);
        tracing::info!(port = self.config.port, "server started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.listener_thread.take() else {
            return Err(RtspError::NotStarted);
        };
        self.stop.store(true, Ordering::Relaxed);
        let _ = handle.join();
        for handle in self.sink_threads.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("server stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.listener_thread.is_some() && !self.stop.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The in-process metadata hub, for an embedder reading events without
    /// enabling the pipe/multicast/MQTT sinks.
    pub fn metadata(&self) -> &Arc<MetadataHub> {
        &self.metadata
    }

    pub fn connection_count(&self) -> usize {
        self.listener.registry().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;
    use crate::mdns::NullMdnsAdvertiser;
    use crate::player::NullPlayer;
    use crate::rtp::NullRtpEndpoint;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::RsaPrivateKey;
    use std::time::Duration;

    fn test_collaborators() -> Collaborators {
        let mut rng = rand::rng();
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let pem = key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap().to_string();
        Collaborators {
            crypto: Arc::new(DefaultCryptoProvider::from_pkcs1_pem(&pem).unwrap()),
            player: Arc::new(NullPlayer::default()),
            rtp: Arc::new(NullRtpEndpoint),
            mdns: Arc::new(NullMdnsAdvertiser),
        }
    }

    #[test]
    fn stop_before_start_is_not_started() {
        let mut server = Server::new(Config { port: 0, ..Config::default() }, test_collaborators());
        assert!(matches!(server.stop(), Err(RtspError::NotStarted)));
    }

    #[test]
    fn double_start_is_already_running() {
        let mut server = Server::new(Config { port: 0, ..Config::default() }, test_collaborators());
        server.start().unwrap();
        assert!(matches!(server.start(), Err(RtspError::AlreadyRunning)));
        server.stop().unwrap();
    }

    #[test]
    fn start_serves_options_over_tcp() {
        let mut server = Server::new(Config { port: 0, ..Config::default() }, test_collaborators());
        server.start().unwrap();
        // The listener binds asynchronously in its own thread; give it a
        // moment before asking it for the bound connection count, which
        // exercises the registry even with zero accepted connections.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(server.connection_count(), 0);
        assert!(server.is_running());
        server.stop().unwrap();
        assert!(!server.is_running());
    }
}
