//! Error types for the RAOP RTSP control-plane server.

use std::fmt;

/// Errors that can occur while framing, dispatching, or serving RTSP
/// requests.
///
/// Variants map to how the dispatcher recovers from them:
///
/// - **Protocol**: [`Parse`](Self::Parse) — malformed RTSP message;
///   recovered by sending a canned 400 and continuing to read.
/// - **Auth**: [`AuthRequired`](Self::AuthRequired) — Digest challenge or
///   mismatch; recovered by sending 401 and continuing.
/// - **Session**: [`SessionConflict`](Self::SessionConflict) (453),
///   [`Precondition`](Self::Precondition) (451),
///   [`InvalidParameters`](Self::InvalidParameters) (456); recovered by
///   sending the non-200 response and continuing.
/// - **Transport**: [`Io`](Self::Io) — socket read/write failure.
/// - **Control**: [`Shutdown`](Self::Shutdown) — the connection's stop latch
///   was observed; [`Resource`](Self::Resource) — allocation/overflow.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request line, header, or TLV/SDP payload.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The client's connection was cleanly closed (EOF) before a full
    /// message was read.
    #[error("connection closed by peer")]
    ChannelClosed,

    /// The connection's stop latch was set while a suspension point was
    /// blocked on I/O.
    #[error("shutdown requested")]
    Shutdown,

    /// HTTP Digest authentication is required or the client's response did
    /// not match. Maps to response code 401.
    #[error("authentication required")]
    AuthRequired,

    /// The requested operation requires holding the session slot and this
    /// connection does not. Maps to response code 451.
    #[error("precondition failed: session slot not held")]
    Precondition,

    /// ANNOUNCE could not acquire the session slot within the preemption
    /// deadline. Maps to response code 453.
    #[error("session already in use")]
    SessionConflict,

    /// A required SDP/DMAP/parameter field was missing or invalid. Maps to response code 456.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Allocation or fixed-size buffer overflow (e.g. the 2 KiB response
    /// size guard).
    #[error("resource error: {0}")]
    Resource(String),

    /// [`crate::server::Server::start`] was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// [`crate::server::Server::stop`] was called before [`crate::server::Server::start`].
    #[error("server not started")]
    NotStarted,
}

/// Specific kind of RTSP message parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `METHOD SP target SP RTSP/1.0` form.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// More than 16 headers were present.
    TooManyHeaders,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::TooManyHeaders => write!(f, "too many headers"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

impl RtspError {
    /// Maps an error to the RTSP status code the dispatcher should answer
    /// with. Returns `None` for errors that do not produce a response (the
    /// connection is torn down instead).
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RtspError::Parse { .. } => Some(400),
            RtspError::AuthRequired => Some(401),
            RtspError::Precondition => Some(451),
            RtspError::SessionConflict => Some(453),
            RtspError::InvalidParameters(_) => Some(456),
            RtspError::Io(_)
            | RtspError::ChannelClosed
            | RtspError::Shutdown
            | RtspError::Resource(_)
            | RtspError::AlreadyRunning
            | RtspError::NotStarted => None,
        }
    }
}
