//! The channel state machine.
//!
//! A channel is one multiplexed logical stream inside a session,
//! identified by a 32-bit id. Outgoing channels are created locally and
//! move to `Pending` once the create message is composed; incoming
//! channels arrive as a create message and move to `Open` when
//! accepted. Cipher negotiation rides on the create/accept pair.

use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};
use sametime_codec::codes::policy;
use sametime_codec::message::{
    self, Body, ChannelAccept, ChannelClose, ChannelCreate, ChannelSend, EncItem, Message,
};
use sametime_codec::{Identity, Login, Opaque};

use crate::cipher::{Cipher, CipherClass, CipherCtx, CipherError, CipherRegistry};

/// Lifecycle state of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Created but not offered yet.
    Closed,
    /// Waiting for the accept exchange.
    Pending,
    /// Accepted on both sides; traffic may flow.
    Open,
    /// Terminally closed with a non-zero code.
    Error,
}

/// One cipher instance still in the running for a channel, kept with
/// the class it was minted from.
struct Candidate {
    class: Rc<dyn CipherClass>,
    cipher: Box<dyn Cipher>,
}

/// A multiplexed logical stream within a session.
pub struct Channel {
    id: u32,
    state: ChannelState,
    error: u32,

    target: Identity,
    remote: Login,

    service: u32,
    proto_type: u32,
    proto_ver: u32,

    offered_policy: u16,
    accepted_policy: u16,
    cipher: Option<u16>,
    ciphers: HashMap<u16, Candidate>,

    offered_info: Opaque,
    accepted_info: Opaque,
    close_code: u32,
    close_info: Opaque,
}

impl Channel {
    /// Build a locally created channel, still closed until opened.
    pub(crate) fn outgoing(
        id: u32,
        target: Identity,
        service: u32,
        proto_type: u32,
        proto_ver: u32,
        offered_policy: u16,
    ) -> Channel {
        Channel {
            id,
            state: ChannelState::Closed,
            error: 0,
            target,
            remote: Login::default(),
            service,
            proto_type,
            proto_ver,
            offered_policy,
            accepted_policy: policy::NONE,
            cipher: None,
            ciphers: HashMap::new(),
            offered_info: Opaque::new(),
            accepted_info: Opaque::new(),
            close_code: 0,
            close_info: Opaque::new(),
        }
    }

    /// Build a channel from a received create message. Offered cipher
    /// entries with an unknown identifier are skipped; negotiation
    /// continues with the rest.
    pub(crate) fn incoming(
        msg: &ChannelCreate,
        registry: &CipherRegistry,
        local_login_id: &str,
    ) -> Channel {
        let mut chan = Channel::outgoing(
            msg.channel,
            msg.target.clone(),
            msg.service,
            msg.proto_type,
            msg.proto_ver,
            msg.enc_mode,
        );
        chan.offered_info = msg.addtl.clone();
        if let Some(creator) = &msg.creator {
            chan.remote = creator.clone();
        }

        if msg.enc_mode != policy::NONE {
            debug!("loading {} offered ciphers", msg.enc_items.len());
            for item in &msg.enc_items {
                let Some(class) = registry.get(item.cipher) else {
                    warn!("skipping unknown offered cipher {:#06x}", item.cipher);
                    continue;
                };
                let mut cipher = class.instantiate();
                let ctx = CipherCtx {
                    local_login_id,
                    remote_login_id: &chan.remote.login_id,
                };
                cipher.offered(&ctx, &item.info);
                chan.ciphers.insert(item.cipher, Candidate { class: class.clone(), cipher });
            }
        }

        chan.state = ChannelState::Pending;
        chan
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    /// The channel id. Incoming ids carry the server's high bit.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// True once the accept exchange finished.
    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Error code, non-zero after an error close.
    pub fn error_code(&self) -> u32 {
        self.error
    }

    /// Service id the channel belongs to.
    pub fn service(&self) -> u32 {
        self.service
    }

    /// Service protocol type.
    pub fn proto_type(&self) -> u32 {
        self.proto_type
    }

    /// Service protocol version.
    pub fn proto_ver(&self) -> u32 {
        self.proto_ver
    }

    /// Target identity of an outgoing channel.
    pub fn target(&self) -> &Identity {
        &self.target
    }

    /// Login record of the remote side, filled by create/accept.
    pub fn remote(&self) -> &Login {
        &self.remote
    }

    /// Encryption policy offered for this channel.
    pub fn offered_policy(&self) -> u16 {
        self.offered_policy
    }

    /// Encryption policy agreed for this channel.
    pub fn accepted_policy(&self) -> u16 {
        self.accepted_policy
    }

    /// Additional info carried on the offer.
    pub fn offered_info(&self) -> &Opaque {
        &self.offered_info
    }

    /// Additional info carried on the acceptance.
    pub fn accepted_info(&self) -> &Opaque {
        &self.accepted_info
    }

    /// Reason code of the close, once closed.
    pub fn close_code(&self) -> u32 {
        self.close_code
    }

    /// Additional info of the close, once closed.
    pub fn close_info(&self) -> &Opaque {
        &self.close_info
    }

    // ─── Opening ─────────────────────────────────────────────────────────────

    /// Formally open the channel. On a closed (outgoing) channel this
    /// composes the create message; on a pending (incoming) channel it
    /// composes the accept. Returns the message to enqueue, or `None`
    /// when the state allows neither.
    pub(crate) fn open(
        &mut self,
        info: &Opaque,
        registry: &CipherRegistry,
        local_login_id: &str,
    ) -> Option<Message> {
        match self.state {
            ChannelState::Closed => Some(self.create(info, registry, local_login_id)),
            ChannelState::Pending => Some(self.accept(info, local_login_id)),
            _ => None,
        }
    }

    fn create(
        &mut self,
        info: &Opaque,
        registry: &CipherRegistry,
        local_login_id: &str,
    ) -> Message {
        self.offered_info = info.clone();

        let mut msg = ChannelCreate {
            reserved: 0,
            channel: self.id,
            target: self.target.clone(),
            service: self.service,
            proto_type: self.proto_type,
            proto_ver: self.proto_ver,
            options: 0,
            addtl: info.clone(),
            creator: None,
            enc_mode: self.offered_policy,
            enc_items: Vec::new(),
            enc_extra: self.offered_policy,
            enc_flag: false,
        };

        debug!("offering encryption policy {:#06x}", msg.enc_mode);

        if self.offered_policy != policy::NONE {
            if registry.is_empty() {
                debug!("backing policy down to none, no ciphers to offer");
                msg.enc_mode = policy::NONE;
                msg.enc_extra = policy::NONE;
            } else {
                for class in registry.classes() {
                    let mut cipher = class.instantiate();
                    let ctx = CipherCtx {
                        local_login_id,
                        remote_login_id: &self.remote.login_id,
                    };
                    let side_info = cipher.offer(&ctx);
                    msg.enc_items.push(EncItem { cipher: class.id(), info: side_info });
                    self.ciphers.insert(class.id(), Candidate {
                        class: class.clone(),
                        cipher,
                    });
                }
            }
        }

        self.state = ChannelState::Pending;
        Message::new(Body::ChannelCreate(msg))
    }

    /// Pick the strongest candidate cipher by policy.
    fn find_best(&self) -> Option<u16> {
        self.ciphers
            .values()
            .max_by_key(|c| c.class.policy())
            .map(|c| c.class.id())
    }

    /// Pick the candidate whose policy matches exactly.
    fn find_match(&self, wanted: u16) -> Option<u16> {
        self.ciphers
            .values()
            .find(|c| c.class.policy() == wanted)
            .map(|c| c.class.id())
    }

    fn accept(&mut self, info: &Opaque, local_login_id: &str) -> Message {
        self.accepted_info = info.clone();

        let choice = match self.offered_policy {
            policy::NONE => None,
            policy::ANY | policy::WHATEVER => self.find_best(),
            wanted => self.find_match(wanted).or_else(|| {
                warn!("couldn't meet channel encryption policy {wanted:#06x}");
                self.find_best()
            }),
        };

        let mut msg = ChannelAccept {
            service: self.service,
            proto_type: self.proto_type,
            proto_ver: self.proto_ver,
            addtl: info.clone(),
            acceptor: None,
            enc_mode: policy::NONE,
            enc_item: EncItem::default(),
            enc_extra: self.offered_policy,
            enc_flag: false,
        };

        let remote_login_id = self.remote.login_id.clone();
        if let Some(id) = choice {
            if let Some(candidate) = self.ciphers.get_mut(&id) {
                let ctx = CipherCtx {
                    local_login_id,
                    remote_login_id: &remote_login_id,
                };
                msg.enc_item = EncItem { cipher: id, info: candidate.cipher.accept(&ctx) };
                self.accepted_policy = candidate.class.policy();
                self.cipher = Some(id);
            }
        } else {
            self.accepted_policy = policy::NONE;
        }

        debug!("accepted channel with policy {:#06x}", self.accepted_policy);
        msg.enc_mode = self.accepted_policy;

        self.state = ChannelState::Open;
        let mut out = Message::new(Body::ChannelAccept(msg));
        out.head.channel = self.id;
        out
    }

    // ─── Closing ─────────────────────────────────────────────────────────────

    /// Close the channel, composing the close message. Re-closing a
    /// closed or errored channel is a silent no-op, which guards
    /// against handler recursion.
    pub(crate) fn close(&mut self, code: u32, info: &Opaque) -> Option<Message> {
        if matches!(self.state, ChannelState::Closed | ChannelState::Error) {
            return None;
        }

        self.close_code = code;
        self.close_info = info.clone();

        let mut msg = Message::new(Body::ChannelClose(ChannelClose {
            reason: code,
            data: info.clone(),
        }));
        msg.head.channel = self.id;

        if code != 0 {
            self.error = code;
            self.state = ChannelState::Error;
        } else {
            self.state = ChannelState::Closed;
        }
        Some(msg)
    }

    // ─── Feeding ─────────────────────────────────────────────────────────────

    /// Apply a received accept. Fails with an error code when the
    /// chosen cipher is not among this channel's candidates, in which
    /// case the caller should close the channel with that code.
    pub(crate) fn feed_accept(
        &mut self,
        msg: &ChannelAccept,
        local_login_id: &str,
    ) -> Result<(), u32> {
        self.accepted_info = msg.addtl.clone();
        if let Some(acceptor) = &msg.acceptor {
            self.remote = acceptor.clone();
        }
        self.accepted_policy = msg.enc_mode;

        debug!(
            "accepted with policy {:#06x} cipher {:#06x}",
            msg.enc_mode, msg.enc_item.cipher
        );

        if self.accepted_policy != policy::NONE {
            let remote_login_id = self.remote.login_id.clone();
            match self.ciphers.get_mut(&msg.enc_item.cipher) {
                Some(candidate) => {
                    let ctx = CipherCtx {
                        local_login_id,
                        remote_login_id: &remote_login_id,
                    };
                    candidate.cipher.accepted(&ctx, &msg.enc_item.info);
                    self.cipher = Some(msg.enc_item.cipher);
                }
                None => {
                    warn!(
                        "peer accepted cipher {:#06x} which was never offered",
                        msg.enc_item.cipher
                    );
                    return Err(sametime_codec::codes::error::NO_COMMON_ENCRYPT);
                }
            }
        }

        self.state = ChannelState::Open;
        Ok(())
    }

    /// Apply a received close. A non-zero reason lands the channel in
    /// the error state.
    pub(crate) fn feed_close(&mut self, msg: &ChannelClose) {
        self.close_code = msg.reason;
        self.close_info = msg.data.clone();

        if msg.reason != 0 {
            self.error = msg.reason;
            self.state = ChannelState::Error;
        } else {
            self.state = ChannelState::Closed;
        }
    }

    /// Apply a received send, decrypting when the head carries the
    /// encrypt option. Returns the service type and payload, or `None`
    /// when the payload had to be dropped.
    pub(crate) fn feed_send(&mut self, options: u16, msg: &ChannelSend) -> Option<(u16, Vec<u8>)> {
        if options & message::option::ENCRYPT == 0 {
            return Some((msg.kind, msg.data.as_slice().to_vec()));
        }

        let Some(candidate) = self.cipher.and_then(|id| self.ciphers.get_mut(&id)) else {
            warn!("dropping encrypted payload on channel {:#010x}: no cipher", self.id);
            return None;
        };
        match candidate.cipher.decrypt(msg.data.as_slice()) {
            Ok(plain) => Some((msg.kind, plain)),
            Err(err) => {
                warn!("dropping payload on channel {:#010x}: {err}", self.id);
                None
            }
        }
    }

    // ─── Sending ─────────────────────────────────────────────────────────────

    /// Compose an outgoing send message. Plaintext when the accepted
    /// policy is none, or when it is whatever and `encrypt` is not
    /// requested; ciphertext with the encrypt option bit otherwise.
    pub(crate) fn send(
        &mut self,
        kind: u16,
        data: &[u8],
        encrypt: bool,
    ) -> Result<Message, CipherError> {
        let mut msg = Message::new(Body::ChannelSend(ChannelSend {
            kind,
            data: Opaque::from(data),
        }));
        msg.head.channel = self.id;

        let plain = self.accepted_policy == policy::NONE
            || (self.accepted_policy == policy::WHATEVER && !encrypt);
        if !plain {
            let candidate = self
                .cipher
                .and_then(|id| self.ciphers.get_mut(&id))
                .ok_or(CipherError::NotNegotiated)?;
            let wire = candidate.cipher.encrypt(data)?;
            msg.head.options |= message::option::ENCRYPT;
            if let Body::ChannelSend(body) = &mut msg.body {
                body.data = Opaque::from(wire);
            }
        }
        Ok(msg)
    }
}
