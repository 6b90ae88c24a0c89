//! Sametime community protocol client core.
//!
//! This crate re-exports the three layers of the workspace:
//!
//! * [`codec`] — buffers, common records, and the message catalog
//! * [`crypto`] — the wire's RC2 variant and DH key exchange
//! * [`session`] — the sans-IO session/channel/cipher engine
//!
//! Most users only need [`Session`]: configure it, call
//! [`Session::start`], shovel bytes between it and a transport, and
//! react to the [`SessionEvent`]s it emits.

#![deny(unsafe_code)]

pub use sametime_codec as codec;
pub use sametime_crypto as crypto;
pub use sametime_session as session;

pub use sametime_codec::{Identity, Login, Opaque, Privacy, Status};
pub use sametime_session::{
    Channel, ChannelState, Session, SessionConfig, SessionError, SessionEvent, SessionState,
};
