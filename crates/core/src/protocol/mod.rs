//! RTSP control-plane protocol.
//!
//! This is a narrow RTSP/1.0 dialect, not general RFC 2326: the sender
//! pushes a description and a stream at the receiver rather than the
//! receiver describing on-demand media, so there is no DESCRIBE/PLAY/PAUSE
//! — only the eight methods the dispatcher recognizes.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | OPTIONS | Capability discovery |
//! | ANNOUNCE | Describe the upcoming stream (SDP body), acquire the session slot |
//! | SETUP | Negotiate transport (UDP ports) |
//! | RECORD | Start the player |
//! | FLUSH | Drop buffered audio up to an RTP timestamp |
//! | TEARDOWN | End the session |
//! | GET_PARAMETER | Read `volume` |
//! | SET_PARAMETER | Push metadata, cover art, volume, or progress |

pub mod dispatch;
pub mod dmap;
pub mod frame;
pub mod params;
pub mod request;
pub mod response;
pub mod sdp;

pub use dispatch::Dispatcher;
pub use frame::read_message;
pub use request::RtspRequest;
pub use response::RtspResponse;
