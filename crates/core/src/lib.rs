//! # raop_rtsp — RTSP control-plane server for AirPlay v1 (RAOP)
//!
//! A Rust library implementing the narrow RTSP/1.0 dialect Apple's "Remote
//! Audio Output Protocol" uses to push a live audio stream at a receiver:
//! the sender describes and pushes the stream (ANNOUNCE/SETUP/RECORD)
//! rather than the receiver serving on-demand media, so there is no
//! DESCRIBE/PLAY/PAUSE.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  Server        — public API, orchestrator      │
//! ├───────────────────────────────────────────────┤
//! │  Listener      — dual-stack accept loop         │
//! │  Connection    — per-connection lifecycle/watchdog│
//! │  Dispatcher    — method handlers, session slot  │
//! ├───────────────────────────────────────────────┤
//! │  Protocol      — framing, SDP, DMAP, parameters │
//! │  Auth          — Apple-Challenge, HTTP Digest   │
//! │  Metadata      — fan-out hub + pipe/UDP/MQTT sinks│
//! ├───────────────────────────────────────────────┤
//! │  Player / RTP / mDNS — external collaborator traits│
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use raop_rtsp::{Config, Server};
//! use raop_rtsp::crypto::DefaultCryptoProvider;
//! use raop_rtsp::mdns::NullMdnsAdvertiser;
//! use raop_rtsp::player::NullPlayer;
//! use raop_rtsp::rtp::NullRtpEndpoint;
//! use raop_rtsp::server::Collaborators;
//! use std::sync::Arc;
//!
//! let crypto = DefaultCryptoProvider::from_pkcs1_pem("...").unwrap();
//! let mut server = Server::new(
//!     Config::default(),
//!     Collaborators {
//!         crypto: Arc::new(crypto),
//!         player: Arc::new(NullPlayer::default()),
//!         rtp: Arc::new(NullRtpEndpoint),
//!         mdns: Arc::new(NullMdnsAdvertiser),
//!     },
//! );
//! server.start().unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — High-level [`Server`] orchestrator and [`server::Collaborators`].
//! - [`listener`] — Dual-stack TCP accept loop.
//! - [`connection`] — Per-connection state, lifecycle, and watchdog.
//! - [`protocol`] — RTSP framing, request/response types, SDP/DMAP/parameter parsers, dispatch.
//! - [`auth`] — Apple-Challenge response and HTTP Digest authentication.
//! - [`crypto`] — [`crypto::CryptoProvider`] trait and the default RustCrypto-backed implementation.
//! - [`metadata`] — Metadata fan-out hub and its pipe/multicast/hub/MQTT sinks.
//! - [`registry`] — Session slot and connection registry.
//! - [`queue`] — Bounded producer/consumer queue.
//! - [`message`] — Shared-ownership request/response message model.
//! - [`player`], [`rtp`], [`mdns`] — External collaborator trait interfaces.
//! - [`config`] — [`Config`] snapshot.
//! - [`error`] — [`RtspError`] enum and [`Result`] alias.

pub mod auth;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod listener;
pub mod mdns;
pub mod message;
pub mod metadata;
pub mod player;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod rtp;
pub mod server;

pub use config::Config;
pub use error::{Result, RtspError};
pub use server::Server;
