//! Request/response message model.
//!
//! The original retains/releases messages by hand so a dispatcher thread and
//! a metadata sink thread can share one message safely. Rust already has
//! that primitive: [`Arc`]. Cloning a [`Message`] is `retain`; the last
//! `Drop` is `release` — there is no sentinel "already freed" value to
//! check because the type system makes a use-after-free unrepresentable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{ParseErrorKind, Result, RtspError};

/// At most 16 header entries per message.
pub const MAX_HEADERS: usize = 16;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a [`Message`] is a request or a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Request { method: String, target: String },
    Response { code: u16 },
}

#[derive(Debug)]
struct MessageInner {
    id: u64,
    kind: MessageKind,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

/// A shared-ownership RTSP request or response.
#[derive(Debug, Clone)]
pub struct Message(Arc<MessageInner>);

impl Message {
    /// Monotonically assigned id.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> &MessageKind {
        &self.0.kind
    }

    pub fn method(&self) -> Option<&str> {
        match &self.0.kind {
            MessageKind::Request { method, .. } => Some(method.as_str()),
            MessageKind::Response { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.0.kind {
            MessageKind::Request { target, .. } => Some(target.as_str()),
            MessageKind::Response { .. } => None,
        }
    }

    /// A handler-supplied response always has a code set at construction
    /// — there is no "unset" state to guard against.
    pub fn code(&self) -> Option<u16> {
        match self.0.kind {
            MessageKind::Response { code } => Some(code),
            MessageKind::Request { .. } => None,
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.0.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.0
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.0.body.as_deref()
    }
}

/// Builds a [`Message`], enforcing the header-count and id invariants
/// before freezing it.
pub struct MessageBuilder {
    kind: MessageKind,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl MessageBuilder {
    pub fn request(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Request {
                method: method.into(),
                target: target.into(),
            },
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn response(code: u16) -> Self {
        Self {
            kind: MessageKind::Response { code },
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        if self.headers.len() >= MAX_HEADERS {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::TooManyHeaders,
            });
        }
        self.headers.push((name.into(), value.into()));
        Ok(self)
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Message {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Message(Arc::new(MessageInner {
            id,
            kind: self.kind,
            headers: self.headers,
            body: self.body,
        }))
    }
}
