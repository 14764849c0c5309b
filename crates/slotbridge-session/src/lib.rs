//! Upstream session protocol engine.
//!
//! Maintains one logical connection to the upstream device-management
//! service: self-delimited JSON frames over a byte stream, request/response
//! correlation by id, unsolicited notification delivery, and
//! reconnect-with-delay after transport failures.
//!
//! The engine runs as a spawned task owning the transport; callers interact
//! through a cheap [`SessionHandle`] and receive connection status changes
//! and push notifications on a [`SessionEvent`] channel.

pub mod codec;
pub mod error;
pub mod message;
pub mod serial;
pub mod session;

pub use codec::{encode_frame, FrameBuffer};
pub use error::SessionError;
pub use message::{params, InboundMessage, Params};
pub use serial::SerialSession;
pub use session::{
    BoxedIo, ConnectionState, Dialer, Session, SessionConfig, SessionEvent, SessionHandle,
    TcpDialer,
};
