//! RTSP response construction and serialization.

use crate::error::{Result, RtspError};
use crate::protocol::request::RtspRequest;

/// Server identification string included in every response.
pub const SERVER_AGENT: &str = "AirTunes/105.1";

/// Hard response-size guard: 2 KiB total with a 1 KiB safety margin.
pub const MAX_RESPONSE_LEN: usize = 2048 - 1024;

/// An RTSP response under construction.
///
/// Status text is one of exactly two strings regardless of the numeric
/// code — `"Unauthorized"` for 401, `"OK"` for everything else, matching
/// the original's reply line.
#[must_use]
pub struct RtspResponse {
    pub code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RtspResponse {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            headers: vec![("Server".to_string(), SERVER_AGENT.to_string())],
            body: None,
        }
    }

    /// The dispatcher's defaults before a handler runs: code 400,
    /// `CSeq` copied from the request, `Server` already set by [`Self::new`].
    pub fn for_request(request: &RtspRequest) -> Self {
        let mut response = Self::new(400);
        if let Some(cseq) = request.cseq() {
            response = response.header("CSeq", cseq);
        }
        response
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace a header's value if present, else append it — used when a
    /// default set by [`Self::for_request`] needs overriding once.
    pub fn set_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if let Some(existing) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            existing.1 = value;
        } else {
            self.headers.push((name.to_string(), value));
        }
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    fn status_text(&self) -> &'static str {
        if self.code == 401 {
            "Unauthorized"
        } else {
            "OK"
        }
    }

    /// Serialize to the wire format, enforcing the 2 KiB - 1 KiB size guard.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = format!("RTSP/1.0 {} {}\r\n", self.code, self.status_text()).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        match &self.body {
            Some(body) => {
                out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
                out.extend_from_slice(body);
            }
            None => out.extend_from_slice(b"\r\n"),
        }

        if out.len() > MAX_RESPONSE_LEN {
            return Err(RtspError::Resource(format!(
                "response of {} bytes exceeds the {} byte guard",
                out.len(),
                MAX_RESPONSE_LEN
            )));
        }
        Ok(out)
    }
}

/// The literal bytes sent for a framer-level `BadPacket`.
pub fn canned_bad_request() -> Vec<u8> {
    b"RTSP/1.0 400 Bad Request\r\nServer: AirTunes/105.1\r\n\r\n".to_vec()
}
