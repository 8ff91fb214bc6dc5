//! Parsed RTSP request.

/// A parsed RTSP request: request line plus headers plus an optional body.
///
/// Built by [`super::frame::read_message`]; header lookup is
/// case-insensitive on read, case-preserving as stored.
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RtspRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cseq(&self) -> Option<&str> {
        self.header("CSeq")
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length")?.trim().parse().ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn body_str(&self) -> Option<&str> {
        self.body
            .as_deref()
            .and_then(|b| std::str::from_utf8(b).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RtspRequest {
        RtspRequest {
            method: "ANNOUNCE".to_string(),
            target: "rtsp://10.0.0.2/stream".to_string(),
            version: "RTSP/1.0".to_string(),
            headers: vec![
                ("CSeq".to_string(), "3".to_string()),
                ("Content-Length".to_string(), "12".to_string()),
                ("Content-Type".to_string(), "application/sdp".to_string()),
            ],
            body: Some(b"v=0\r\ns=x\r\n\r\n".to_vec()),
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = sample();
        assert_eq!(req.header("cseq"), Some("3"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/sdp"));
    }

    #[test]
    fn content_length_parses_to_usize() {
        assert_eq!(sample().content_length(), Some(12));
    }

    #[test]
    fn missing_header_is_none() {
        assert_eq!(sample().header("Transport"), None);
    }
}
