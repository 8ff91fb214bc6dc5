//! Configuration snapshot.
//!
//! The server reads one immutable [`Config`] at startup; there is no live
//! reload.

use serde::{Deserialize, Serialize};

/// Process-wide configuration snapshot.
///
/// Deserializes from YAML (see `crates/cli`). Every field has a default so
/// a partial config file — or none at all — still produces a usable server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP listen port.
    pub port: u16,
    /// Digest password. Empty string disables authentication.
    pub password: String,
    /// Seconds for `SO_RCVTIMEO` and the watchdog bark interval.
    pub timeout: u64,
    /// Disables the watchdog entirely: no barks, no `stop=1`, no
    /// `cmd_unfixable`. A `timeout` of `0` has the same effect.
    pub dont_check_timeout: bool,
    /// Permits preemption of an existing session slot holder.
    pub allow_session_interruption: bool,
    /// Whether `image/*` SET_PARAMETER bodies are forwarded as metadata.
    pub get_coverart: bool,
    /// Enables the pipe and multicast metadata sinks.
    pub metadata_enabled: bool,
    /// Path of the named pipe metadata sink.
    pub metadata_pipename: String,
    /// IPv4 multicast group for the UDP metadata sink.
    pub metadata_sockaddr: String,
    /// UDP port for the multicast metadata sink.
    pub metadata_sockport: u16,
    /// Maximum UDP datagram payload size for the multicast sink.
    pub metadata_sockmsglength: usize,
    /// Enables the MQTT metadata sink.
    pub mqtt_enabled: bool,
    /// MQTT broker address, `host:port`.
    pub mqtt_broker: String,
    /// MQTT topic metadata is published to.
    pub mqtt_topic: String,
    /// Current volume in dB, readable via GET_PARAMETER.
    pub airplay_volume: f64,
    /// MAC address used in the Apple-Challenge response.
    pub hw_addr: [u8; 6],
    /// Command invoked once by the watchdog after repeated barks.
    pub cmd_unfixable: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 5000,
            password: String::new(),
            timeout: 120,
            dont_check_timeout: false,
            allow_session_interruption: true,
            get_coverart: true,
            metadata_enabled: false,
            metadata_pipename: "/tmp/shairport-sync-metadata".to_string(),
            metadata_sockaddr: "226.0.0.1".to_string(),
            metadata_sockport: 5555,
            metadata_sockmsglength: 65000,
            mqtt_enabled: false,
            mqtt_broker: String::new(),
            mqtt_topic: "raop/metadata".to_string(),
            airplay_volume: 0.0,
            hw_addr: [0, 0, 0, 0, 0, 0],
            cmd_unfixable: None,
        }
    }
}

impl Config {
    /// Parse a configuration snapshot from a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}
