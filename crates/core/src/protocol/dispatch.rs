//! Request dispatcher and method handlers.

use std::net::IpAddr;
use std::sync::Arc;

use base64::Engine;

use crate::auth;
use crate::config::Config;
use crate::connection::ConnectionState;
use crate::crypto::{CryptoProvider, RsaMode};
use crate::error::{Result, RtspError};
use crate::metadata::{MetadataHub, MetadataPackage};
use crate::player::Player;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp::{self, StreamType};
use crate::protocol::{dmap, params};
use crate::registry::SessionSlot;
use crate::rtp::RtpEndpoint;

/// The eight methods this dialect supports, in the order OPTIONS advertises
/// them.
const SUPPORTED_METHODS: &str =
    "ANNOUNCE, SETUP, RECORD, FLUSH, TEARDOWN, OPTIONS, GET_PARAMETER, SET_PARAMETER";

/// Wires the session slot, crypto/player/RTP collaborators, and metadata
/// hub into one request/response pipeline.
pub struct Dispatcher {
    config: Arc<Config>,
    slot: Arc<SessionSlot>,
    crypto: Arc<dyn CryptoProvider>,
    player: Arc<dyn Player>,
    rtp: Arc<dyn RtpEndpoint>,
    metadata: Arc<MetadataHub>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<Config>,
        slot: Arc<SessionSlot>,
        crypto: Arc<dyn CryptoProvider>,
        player: Arc<dyn Player>,
        rtp: Arc<dyn RtpEndpoint>,
        metadata: Arc<MetadataHub>,
    ) -> Self {
        Self {
            config,
            slot,
            crypto,
            player,
            rtp,
            metadata,
        }
    }

    pub fn player_running(&self) -> bool {
        self.player.is_running()
    }

    /// Dispatch one request to completion. Handler errors are mapped to
    /// their response code rather than propagated — the connection's
    /// main loop only sees an I/O-level [`RtspError`] from the framer, not
    /// from here.
    pub fn dispatch(&self, conn: &mut ConnectionState, request: &RtspRequest) -> RtspResponse {
        let mut response = RtspResponse::for_request(request);

        if let Some(challenge) = request.header("Apple-Challenge") {
            match self.apple_challenge_header(conn, challenge) {
                Ok(value) => response = response.header("Apple-Response", value),
                Err(err) => tracing::warn!(%err, "apple-challenge response failed"),
            }
        }

        if !self.config.password.is_empty() && !conn.authorized {
            let nonce = conn
                .nonce
                .get_or_insert_with(auth::generate_nonce)
                .clone();
            if auth::verify_digest(self.crypto.as_ref(), request, &self.config.password, &nonce) {
                conn.authorized = true;
            } else {
                return response
                    .with_code(401)
                    .set_header("WWW-Authenticate", format!("Digest realm=\"raop\", nonce=\"{nonce}\""));
            }
        }

        let result = match request.method.as_str() {
            "OPTIONS" => Ok(self.handle_options(response)),
            "ANNOUNCE" => self.handle_announce(conn, request, response),
            "SETUP" => self.handle_setup(conn, request, response),
            "RECORD" => self.handle_record(conn, request, response),
            "FLUSH" => self.handle_flush(conn, request, response),
            "TEARDOWN" => self.handle_teardown(conn, response),
            "GET_PARAMETER" => Ok(self.handle_get_parameter(request, response)),
            "SET_PARAMETER" => Ok(self.handle_set_parameter(request, response)),
            _ => {
                tracing::debug!(method = %request.method, "unrecognized RTSP method");
                Ok(response)
            }
        };

        match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(method = %request.method, %err, "handler returned an error");
                RtspResponse::for_request(request).with_code(err.status_code().unwrap_or(400))
            }
        }
    }

    /// Connection-exit cleanup owed to this connection's state: stop
    /// the player if this connection started it, tear down RTP, and release
    /// the session slot if held.
    pub fn teardown(&self, conn: &mut ConnectionState) {
        self.stop_player_if_owned(conn);
        if conn.rtp_running {
            self.rtp.rtp_terminate();
            conn.rtp_running = false;
        }
        self.slot.release(conn.connection_id());
    }

    fn stop_player_if_owned(&self, conn: &mut ConnectionState) {
        if conn.player_owned {
            self.player.player_stop();
            self.metadata
                .send(MetadataPackage::from_bytes(*b"ssnc", *b"pend", None), true);
            conn.player_owned = false;
        }
    }

    fn apple_challenge_header(&self, conn: &ConnectionState, challenge: &str) -> Result<String> {
        let local_ip = ip_bytes(conn.local_addr.ip());
        auth::apple_challenge_response(self.crypto.as_ref(), challenge, &local_ip, self.config.hw_addr)
    }

    fn handle_options(&self, response: RtspResponse) -> RtspResponse {
        response.with_code(200).header("Public", SUPPORTED_METHODS)
    }

    fn handle_announce(
        &self,
        conn: &mut ConnectionState,
        request: &RtspRequest,
        response: RtspResponse,
    ) -> Result<RtspResponse> {
        self.slot.acquire(
            conn.connection_id(),
            conn.shared.stop.clone(),
            self.config.allow_session_interruption,
        )?;

        let info = sdp::parse_sdp(request.body_str().unwrap_or_default());
        let mut stream = info.stream.clone();

        match (&info.aes_iv_b64, &info.rsaaeskey_b64) {
            (None, None) => stream.encrypted = false,
            (Some(iv_b64), Some(key_b64)) => {
                if let Err(err) = self.apply_announce_crypto(&mut stream, iv_b64, key_b64) {
                    self.slot.release(conn.connection_id());
                    return Err(err);
                }
            }
            _ => {
                self.slot.release(conn.connection_id());
                return Err(RtspError::InvalidParameters(
                    "aesiv and rsaaeskey must both be present or both absent".to_string(),
                ));
            }
        }

        if stream.stream_type == StreamType::Unknown {
            self.slot.release(conn.connection_id());
            return Err(RtspError::InvalidParameters(
                "stream type could not be determined from SDP".to_string(),
            ));
        }

        conn.stream = stream;
        conn.min_latency = info.min_latency;
        conn.max_latency = info.max_latency;

        if let Some(client_name) = request.header("X-Apple-Client-Name") {
            self.metadata.send(
                MetadataPackage::from_bytes(*b"ssnc", *b"snam", Some(client_name.as_bytes())),
                false,
            );
        }
        if let Some(user_agent) = request.header("User-Agent") {
            conn.user_agent = Some(user_agent.to_string());
            conn.airplay_version = parse_airplay_version(user_agent);
            self.metadata.send(
                MetadataPackage::from_bytes(*b"ssnc", *b"snua", Some(user_agent.as_bytes())),
                false,
            );
        }

        let peer_ip = conn.peer_addr.ip().to_string();
        let local_ip = conn.local_addr.ip().to_string();
        self.metadata
            .send(MetadataPackage::from_bytes(*b"ssnc", *b"clip", Some(peer_ip.as_bytes())), false);
        self.metadata
            .send(MetadataPackage::from_bytes(*b"ssnc", *b"svip", Some(local_ip.as_bytes())), false);

        Ok(response.with_code(200))
    }

    fn apply_announce_crypto(
        &self,
        stream: &mut sdp::StreamDescriptor,
        iv_b64: &str,
        key_b64: &str,
    ) -> Result<()> {
        let iv = base64::engine::general_purpose::STANDARD
            .decode(iv_b64)
            .map_err(|_| RtspError::InvalidParameters("aesiv is not valid base64".to_string()))?;
        if iv.len() != 16 {
            return Err(RtspError::InvalidParameters(
                "aesiv did not decode to 16 bytes".to_string(),
            ));
        }

        let wrapped_key = base64::engine::general_purpose::STANDARD
            .decode(key_b64)
            .map_err(|_| RtspError::InvalidParameters("rsaaeskey is not valid base64".to_string()))?;
        let key = self.crypto.rsa_apply(&wrapped_key, RsaMode::Key)?;
        if key.len() != 16 {
            return Err(RtspError::InvalidParameters(
                "rsaaeskey did not decode to 16 bytes".to_string(),
            ));
        }

        let mut iv_arr = [0u8; 16];
        iv_arr.copy_from_slice(&iv);
        let mut key_arr = [0u8; 16];
        key_arr.copy_from_slice(&key);

        stream.encrypted = true;
        stream.aes_iv = Some(iv_arr);
        stream.aes_key = Some(key_arr);
        Ok(())
    }

    fn handle_setup(
        &self,
        conn: &mut ConnectionState,
        request: &RtspRequest,
        response: RtspResponse,
    ) -> Result<RtspResponse> {
        if !self.slot.is_held_by(conn.connection_id()) {
            return Err(RtspError::Precondition);
        }

        if let Some(active_remote) = request.header("Active-Remote") {
            conn.active_remote = Some(active_remote.to_string());
            self.metadata.send(
                MetadataPackage::from_bytes(*b"ssnc", *b"acre", Some(active_remote.as_bytes())),
                false,
            );
        }
        if let Some(dacp_id) = request.header("DACP-ID") {
            conn.dacp_id = Some(dacp_id.to_string());
            self.metadata
                .send(MetadataPackage::from_bytes(*b"ssnc", *b"daid", Some(dacp_id.as_bytes())), false);
        }

        let Some(transport_header) = request.header("Transport") else {
            self.slot.release(conn.connection_id());
            return Err(RtspError::Precondition);
        };
        let transport = params::parse_transport(transport_header);
        let ports_requested = (
            transport.get("control_port").and_then(|v| v.parse::<u16>().ok()),
            transport.get("timing_port").and_then(|v| v.parse::<u16>().ok()),
        );
        let (control_port, timing_port) = match ports_requested {
            (Some(control), Some(timing)) => (control, timing),
            _ => {
                self.slot.release(conn.connection_id());
                return Err(RtspError::Precondition);
            }
        };

        let ports = if conn.rtp_running {
            tracing::warn!(
                connection_id = conn.connection_id(),
                "SETUP received while RTP already running, keeping prior ports"
            );
            match conn.rtp_ports {
                Some(ports) => ports,
                None => {
                    self.slot.release(conn.connection_id());
                    return Err(RtspError::Precondition);
                }
            }
        } else {
            match self
                .rtp
                .rtp_setup(control_port, timing_port)
                .and_then(|ports| self.rtp.rtp_initialise().map(|_| ports))
            {
                Ok(ports) => {
                    conn.rtp_running = true;
                    ports
                }
                Err(err) => {
                    self.slot.release(conn.connection_id());
                    return Err(err);
                }
            }
        };
        conn.rtp_ports = Some(ports);
        conn.remote_control_port = Some(control_port);
        conn.remote_timing_port = Some(timing_port);

        let transport_value = format!(
            "RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;control_port={};timing_port={};server_port={}",
            ports.control, ports.timing, ports.audio
        );

        Ok(response
            .with_code(200)
            .header("Transport", transport_value)
            .header("Session", "1"))
    }

    fn handle_record(
        &self,
        conn: &mut ConnectionState,
        request: &RtspRequest,
        response: RtspResponse,
    ) -> Result<RtspResponse> {
        if !self.slot.is_held_by(conn.connection_id()) {
            return Err(RtspError::Precondition);
        }

        if let Some(rtptime) = request.header("RTP-Info").and_then(parse_rtptime) {
            self.emit_flush_request(Some(rtptime));
            self.player.player_flush(Some(rtptime));
        }

        if !self.player.is_running() {
            self.player.player_play();
            conn.player_owned = true;
            self.metadata
                .send(MetadataPackage::from_bytes(*b"ssnc", *b"pbeg", None), true);
        }

        Ok(response.with_code(200).header("Audio-Latency", "11025"))
    }

    fn handle_flush(
        &self,
        conn: &mut ConnectionState,
        request: &RtspRequest,
        response: RtspResponse,
    ) -> Result<RtspResponse> {
        if !self.slot.is_held_by(conn.connection_id()) {
            return Err(RtspError::Precondition);
        }

        let rtptime = request.header("RTP-Info").and_then(parse_rtptime);
        self.emit_flush_request(rtptime);
        self.player.player_flush(rtptime);

        Ok(response.with_code(200))
    }

    /// `ssnc/flsr` immediately before a flush, carrying `rtptime` when
    /// known.
    fn emit_flush_request(&self, rtptime: Option<u32>) {
        let payload = rtptime.map(|t| t.to_string());
        self.metadata.send(
            MetadataPackage::from_bytes(*b"ssnc", *b"flsr", payload.as_deref().map(str::as_bytes)),
            true,
        );
    }

    fn handle_teardown(&self, conn: &mut ConnectionState, response: RtspResponse) -> Result<RtspResponse> {
        if !self.slot.is_held_by(conn.connection_id()) {
            return Err(RtspError::Precondition);
        }

        self.stop_player_if_owned(conn);

        Ok(response.with_code(200).header("Connection", "close"))
    }

    fn handle_get_parameter(&self, request: &RtspRequest, response: RtspResponse) -> RtspResponse {
        if request.body_str().map(str::trim) == Some("volume") {
            let body = format!("\r\nvolume: {:.6}\r\n", self.config.airplay_volume);
            return response.with_code(200).body(body.into_bytes());
        }
        response.with_code(200)
    }

    fn handle_set_parameter(&self, request: &RtspRequest, response: RtspResponse) -> RtspResponse {
        let content_type = request.content_type().unwrap_or_default();
        let body = request.body.as_deref().unwrap_or_default();

        if content_type.eq_ignore_ascii_case("application/x-dmap-tagged") {
            self.handle_dmap_body(request, body);
        } else if content_type.to_ascii_lowercase().starts_with("image/") {
            self.handle_image_body(body);
        } else if content_type.eq_ignore_ascii_case("text/parameters") {
            self.handle_text_parameters(body);
        } else {
            tracing::debug!(content_type, "SET_PARAMETER with unrecognized content type");
        }

        response.with_code(200)
    }

    fn handle_dmap_body(&self, request: &RtspRequest, body: &[u8]) {
        let rtptime = request.header("RTP-Info").and_then(parse_rtptime);
        let start_payload = rtptime.map(|t| t.to_string());
        self.metadata.send(
            MetadataPackage::from_bytes(*b"ssnc", *b"mdst", start_payload.as_deref().map(str::as_bytes)),
            true,
        );

        match dmap::parse_dmap_body(body) {
            Ok(records) => {
                for record in records {
                    self.metadata.send(
                        MetadataPackage::from_bytes(*b"core", record.tag, Some(&record.payload)),
                        true,
                    );
                }
            }
            Err(err) => tracing::warn!(%err, "failed to parse dmap body"),
        }

        self.metadata
            .send(MetadataPackage::from_bytes(*b"ssnc", *b"mden", None), true);
    }

    fn handle_image_body(&self, body: &[u8]) {
        if !self.config.get_coverart {
            return;
        }
        self.metadata
            .send(MetadataPackage::from_bytes(*b"ssnc", *b"pcst", None), true);
        self.metadata
            .send(MetadataPackage::from_bytes(*b"ssnc", *b"PICT", Some(body)), true);
        self.metadata
            .send(MetadataPackage::from_bytes(*b"ssnc", *b"pcen", None), true);
    }

    fn handle_text_parameters(&self, body: &[u8]) {
        let text = String::from_utf8_lossy(body);
        for (key, value) in params::parse_text_parameters(&text) {
            match key.as_str() {
                "volume" => {
                    if let Ok(db) = value.parse::<f64>() {
                        self.player.player_volume(db);
                        let payload = format!("{db:.6},0.000000,0.000000,0.000000");
                        self.metadata.send(
                            MetadataPackage::from_bytes(*b"ssnc", *b"pvol", Some(payload.as_bytes())),
                            true,
                        );
                    }
                }
                "progress" => {
                    self.metadata.send(
                        MetadataPackage::from_bytes(*b"ssnc", *b"prgr", Some(value.as_bytes())),
                        true,
                    );
                }
                _ => {}
            }
        }
    }
}

fn ip_bytes(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Extract the integer from a `User-Agent` containing `AirPlay/<n>`.
fn parse_airplay_version(user_agent: &str) -> Option<u32> {
    let rest = user_agent.split("AirPlay/").nth(1)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Extract `rtptime` from an `RTP-Info` header value.
fn parse_rtptime(header: &str) -> Option<u32> {
    let rest = header.split("rtptime=").nth(1)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
