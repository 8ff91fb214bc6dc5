//! SDP line parser for ANNOUNCE bodies.
//!
//! Unlike a DESCRIBE-serving RTSP server, the core here only *consumes*
//! SDP — the sender describes the stream it is about to push. Parsing is
//! line-oriented prefix matching, exactly as the original does it; no
//! generic SDP grammar is implemented because only a handful of attribute
//! lines are ever meaningful here.

/// Negotiated audio stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamType {
    #[default]
    Unknown,
    Alac,
    Pcm,
}

/// The stream descriptor carried in connection state.
#[derive(Debug, Clone, Default)]
pub struct StreamDescriptor {
    pub stream_type: StreamType,
    pub encrypted: bool,
    pub aes_iv: Option<[u8; 16]>,
    pub aes_key: Option<[u8; 16]>,
    /// Raw ALAC `fmtp` integers, in wire order.
    pub fmtp: Option<[i64; 12]>,
    pub rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
    pub bytes_per_frame: u32,
}

/// Everything extracted from an ANNOUNCE body before crypto is applied.
///
/// `aes_iv_b64`/`rsaaeskey_b64` are still base64 text — decoding the key
/// requires `rsa_apply(..., RSA_MODE_KEY)`, which lives behind
/// [`crate::crypto::CryptoProvider`] and is out of scope for a pure parser.
#[derive(Debug, Clone, Default)]
pub struct AnnounceInfo {
    pub session_id: Option<String>,
    pub stream: StreamDescriptor,
    pub aes_iv_b64: Option<String>,
    pub rsaaeskey_b64: Option<String>,
    pub min_latency: Option<u32>,
    pub max_latency: Option<u32>,
}

/// Parse an ANNOUNCE SDP body.
pub fn parse_sdp(body: &str) -> AnnounceInfo {
    let mut info = AnnounceInfo::default();

    for raw_line in body.split(['\r', '\n']) {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("o=iTunes ") {
            info.session_id = rest.split_whitespace().next().map(str::to_string);
        } else if let Some(rest) = line.strip_prefix("a=fmtp:") {
            if let Some(fmtp) = parse_fmtp(rest) {
                info.stream.stream_type = StreamType::Alac;
                info.stream.bit_depth = fmtp[3] as u8;
                info.stream.channels = fmtp[7] as u8;
                info.stream.rate = fmtp[11] as u32;
                info.stream.bytes_per_frame =
                    info.stream.channels as u32 * (info.stream.bit_depth as u32 / 8);
                info.stream.fmtp = Some(fmtp);
            }
        } else if let Some(rest) = line.strip_prefix("a=rtpmap:96 ") {
            if rest.trim() == "L16/44100/2" {
                info.stream.stream_type = StreamType::Pcm;
                info.stream.rate = 44100;
                info.stream.channels = 2;
                info.stream.bit_depth = 16;
                info.stream.bytes_per_frame = 4;
            }
        } else if let Some(rest) = line.strip_prefix("a=aesiv:") {
            info.aes_iv_b64 = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("a=rsaaeskey:") {
            info.rsaaeskey_b64 = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("a=min-latency:") {
            info.min_latency = rest.trim().parse().ok();
        } else if let Some(rest) = line.strip_prefix("a=max-latency:") {
            info.max_latency = rest.trim().parse().ok();
        }
    }

    info
}

/// `a=fmtp:<payload type> <11 more ints>`; the leading payload type (`96`)
/// is part of the 12 integers but otherwise unused here.
fn parse_fmtp(rest: &str) -> Option<[i64; 12]> {
    let values: Vec<i64> = rest.split_whitespace().filter_map(|t| t.parse().ok()).collect();
    if values.len() != 12 {
        return None;
    }
    let mut out = [0i64; 12];
    out.copy_from_slice(&values);
    Some(out)
}
