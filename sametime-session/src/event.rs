//! Typed events surfaced by the session.
//!
//! The engine never calls back into the embedder mid-dispatch (the one
//! exception being the incoming-channel claim handler); everything else
//! lands on the session's event queue to be drained with
//! [`crate::Session::next_event`].

use sametime_codec::{Login, Opaque};

use crate::session::SessionState;

/// A notification from the session engine.
#[derive(Debug)]
pub enum SessionEvent {
    /// The session moved to a new state. `info` carries the reason
    /// code for stopping/stopped transitions and is zero elsewhere.
    StateChanged {
        /// The state entered.
        state: SessionState,
        /// Reason code where applicable.
        info: u32,
    },
    /// Outgoing data is queued; the embedder should flush when the
    /// transport is writable.
    Pending,
    /// The session's status record changed.
    GotStatus,
    /// The session's privacy record changed.
    GotPrivacy,
    /// An administrative broadcast arrived.
    Admin {
        /// The broadcast text.
        text: String,
    },
    /// An announcement arrived.
    Announce {
        /// Whether replies are allowed.
        may_reply: bool,
        /// The sender, when identified.
        sender: Option<Login>,
        /// The announcement text.
        text: String,
    },
    /// The server answered (or probed) for a service's presence.
    SenseService {
        /// The service id in question.
        service: u32,
    },
    /// An outgoing channel finished negotiation and is open.
    ChannelOpened {
        /// The channel id.
        channel: u32,
    },
    /// A channel reached a terminal state.
    ChannelClosed {
        /// The channel id.
        channel: u32,
        /// Close reason; non-zero reports an error.
        code: u32,
        /// Additional close information.
        info: Opaque,
    },
    /// Service data arrived on an open channel, already decrypted.
    ChannelData {
        /// The channel id.
        channel: u32,
        /// Service-defined send type.
        kind: u16,
        /// The payload.
        data: Vec<u8>,
    },
}
