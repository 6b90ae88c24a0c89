//! Sametime community protocol engine.
//!
//! This crate is the sans-IO core of a community client: it multiplexes
//! logical channels over one connection, negotiates per-channel
//! encryption, and drives the multi-phase login state machine. It owns
//! no socket and spawns no task. The embedder owns the transport:
//!
//! * push received bytes in with [`Session::feed`]
//! * pull rendered frames out with [`Session::flush`] when the
//!   transport is writable (a [`SessionEvent::Pending`] event says
//!   there is something to pull)
//! * report a broken transport by calling [`Session::stop`] with
//!   [`sametime_codec::codes::error::CONNECTION_BROKEN`]
//!
//! Everything the engine wants to tell the embedder arrives as a
//! [`SessionEvent`]; the engine never throws out of a dispatch.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod cipher;
pub mod event;
pub mod parser;
pub mod queue;
pub mod session;

pub use channel::{Channel, ChannelState};
pub use cipher::{Cipher, CipherClass, CipherCtx, CipherError, CipherRegistry};
pub use event::SessionEvent;
pub use parser::Parser;
pub use session::{
    MASTER_CHANNEL, PROTOCOL_VERSION_MAJOR, PROTOCOL_VERSION_MINOR, Session, SessionConfig,
    SessionError, SessionState,
};
