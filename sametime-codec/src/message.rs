//! The tagged message catalog.
//!
//! Every message starts with the common head: `type u16; options u16;
//! channel u32`, optionally followed by an attributes opaque when the
//! [`option::ATTRIBS`] bit is set. The variant-specific body follows.
//!
//! Wire oddities inherited from the deployed servers are preserved here
//! on purpose: the login body writes its auth data before the auth type
//! and appends a `u16` zero nobody reads back; channel create/accept
//! wrap their encryption block in an opaque whose length the reader only
//! skips; both also append a trailing `u16 0x07` that the reader
//! ignores.

use std::fmt;

use crate::common::{self, Identity, Opaque};
use crate::deserialize::GetBuffer;
use crate::serialize::PutBuffer;

/// Message type codes.
pub mod kind {
    /// Client handshake.
    pub const HANDSHAKE: u16 = 0x0000;
    /// Login request.
    pub const LOGIN: u16 = 0x0001;
    /// Open a new channel.
    pub const CHANNEL_CREATE: u16 = 0x0002;
    /// Close a channel.
    pub const CHANNEL_CLOSE: u16 = 0x0003;
    /// Data on a channel.
    pub const CHANNEL_SEND: u16 = 0x0004;
    /// Accept an offered channel.
    pub const CHANNEL_ACCEPT: u16 = 0x0006;
    /// Channel-less service datagram.
    pub const ONE_TIME: u16 = 0x0007;
    /// User status report.
    pub const STATUS: u16 = 0x0009;
    /// Privacy list report.
    pub const PRIVACY: u16 = 0x000b;
    /// Service presence probe/answer.
    pub const SENSE_SERVICE: u16 = 0x0011;
    /// Continue a redirected login in place.
    pub const LOGIN_FORCE: u16 = 0x0016;
    /// Server redirecting the login elsewhere.
    pub const LOGIN_REDIRECT: u16 = 0x0018;
    /// Administrative broadcast text.
    pub const ADMIN: u16 = 0x0019;
    /// Announcement between users.
    pub const ANNOUNCE: u16 = 0x0022;
    /// Server handshake acknowledgement.
    pub const HANDSHAKE_ACK: u16 = 0x8000;
    /// Server login acknowledgement.
    pub const LOGIN_ACK: u16 = 0x8001;
}

/// Option bits carried in the message head.
pub mod option {
    /// The message payload is encrypted.
    pub const ENCRYPT: u16 = 0x4000;
    /// An attributes opaque follows the fixed head.
    pub const ATTRIBS: u16 = 0x8000;
}

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors produced while reading a message from a buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The buffer ran out before the message was fully read.
    Truncated {
        /// Type code of the message being read (0 if the head itself
        /// was short).
        kind: u16,
    },
    /// The type code does not match any cataloged message.
    UnknownKind {
        /// The unrecognized type code.
        kind: u16,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { kind } => {
                write!(f, "not enough data for message type {kind:#06x}")
            }
            Self::UnknownKind { kind } => {
                write!(f, "unknown message type {kind:#06x}")
            }
        }
    }
}

impl std::error::Error for Error {}

// ─── Head ────────────────────────────────────────────────────────────────────

/// The common message head shared by all variants.
///
/// The type code is not stored here; it is derived from the body when
/// writing. The [`option::ATTRIBS`] bit is managed automatically from
/// the `attribs` field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Head {
    /// Option bits, see [`option`].
    pub options: u16,
    /// Id of the channel this message belongs to; 0 is the master
    /// channel.
    pub channel: u32,
    /// Optional message attributes.
    pub attribs: Option<Opaque>,
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// A complete protocol message: head plus tagged body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The common head.
    pub head: Head,
    /// The variant-specific body.
    pub body: Body,
}

impl Message {
    /// Wrap a body with a default head.
    pub fn new(body: Body) -> Self {
        Self { head: Head::default(), body }
    }

    /// Marshal the message onto `b`.
    pub fn put(&self, b: &mut PutBuffer) {
        b.put_u16(self.body.kind());
        let mut options = self.head.options & !option::ATTRIBS;
        if self.head.attribs.is_some() {
            options |= option::ATTRIBS;
        }
        b.put_u16(options);
        b.put_u32(self.head.channel);
        if let Some(attribs) = &self.head.attribs {
            b.put_opaque(attribs);
        }
        self.body.put(&self.head, b);
    }

    /// Unmarshal a message from `b`.
    pub fn get(b: &mut GetBuffer) -> Result<Message, Error> {
        let kind = b.get_u16();
        let mut head = Head {
            options: b.get_u16(),
            channel: b.get_u32(),
            attribs: None,
        };
        if head.options & option::ATTRIBS != 0 {
            head.attribs = Some(b.get_opaque());
        }
        if b.error() {
            return Err(Error::Truncated { kind });
        }
        let body = Body::get(kind, &mut head, b)?;
        if b.error() {
            return Err(Error::Truncated { kind });
        }
        Ok(Message { head, body })
    }

    /// Render the message to a fresh byte vector (no length framing).
    pub fn encode(&self) -> Vec<u8> {
        let mut b = PutBuffer::new();
        self.put(&mut b);
        b.into_vec()
    }

    /// Parse a message from a complete frame body.
    pub fn decode(bytes: &[u8]) -> Result<Message, Error> {
        let mut b = GetBuffer::wrap(bytes);
        Self::get(&mut b)
    }
}

// ─── Body ────────────────────────────────────────────────────────────────────

/// The variant-specific part of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    /// Client handshake.
    Handshake(Handshake),
    /// Server handshake acknowledgement.
    HandshakeAck(HandshakeAck),
    /// Login request.
    Login(Login),
    /// Server login acknowledgement.
    LoginAck(LoginAck),
    /// Login redirected to another host.
    LoginRedirect(LoginRedirect),
    /// Continue the login here despite a redirect.
    LoginForce,
    /// Open a new channel.
    ChannelCreate(ChannelCreate),
    /// Accept an offered channel.
    ChannelAccept(ChannelAccept),
    /// Data on a channel.
    ChannelSend(ChannelSend),
    /// Close a channel.
    ChannelClose(ChannelClose),
    /// Channel-less service datagram.
    OneTime(OneTime),
    /// User status report.
    Status(StatusMsg),
    /// Privacy list report.
    Privacy(PrivacyMsg),
    /// Service presence probe/answer.
    SenseService(SenseService),
    /// Administrative broadcast.
    Admin(Admin),
    /// Announcement between users.
    Announce(Announce),
}

impl Body {
    /// The wire type code of this variant.
    pub fn kind(&self) -> u16 {
        match self {
            Self::Handshake(_) => kind::HANDSHAKE,
            Self::HandshakeAck(_) => kind::HANDSHAKE_ACK,
            Self::Login(_) => kind::LOGIN,
            Self::LoginAck(_) => kind::LOGIN_ACK,
            Self::LoginRedirect(_) => kind::LOGIN_REDIRECT,
            Self::LoginForce => kind::LOGIN_FORCE,
            Self::ChannelCreate(_) => kind::CHANNEL_CREATE,
            Self::ChannelAccept(_) => kind::CHANNEL_ACCEPT,
            Self::ChannelSend(_) => kind::CHANNEL_SEND,
            Self::ChannelClose(_) => kind::CHANNEL_CLOSE,
            Self::OneTime(_) => kind::ONE_TIME,
            Self::Status(_) => kind::STATUS,
            Self::Privacy(_) => kind::PRIVACY,
            Self::SenseService(_) => kind::SENSE_SERVICE,
            Self::Admin(_) => kind::ADMIN,
            Self::Announce(_) => kind::ANNOUNCE,
        }
    }

    fn put(&self, head: &Head, b: &mut PutBuffer) {
        match self {
            Self::Handshake(m) => m.put(head, b),
            Self::HandshakeAck(m) => m.put(b),
            Self::Login(m) => m.put(b),
            Self::LoginAck(m) => m.put(b),
            Self::LoginRedirect(m) => m.put(b),
            Self::LoginForce => {}
            Self::ChannelCreate(m) => m.put(b),
            Self::ChannelAccept(m) => m.put(b),
            Self::ChannelSend(m) => m.put(b),
            Self::ChannelClose(m) => m.put(b),
            Self::OneTime(m) => m.put(b),
            Self::Status(m) => m.status.put(b),
            Self::Privacy(m) => m.privacy.put(b),
            Self::SenseService(m) => b.put_u32(m.service),
            Self::Admin(m) => b.put_str(&m.text),
            Self::Announce(m) => m.put(b),
        }
    }

    fn get(kind: u16, head: &mut Head, b: &mut GetBuffer) -> Result<Body, Error> {
        let body = match kind {
            kind::HANDSHAKE => Self::Handshake(Handshake::get(head, b)),
            kind::HANDSHAKE_ACK => Self::HandshakeAck(HandshakeAck::get(b)),
            kind::LOGIN => Self::Login(Login::get(b)),
            kind::LOGIN_ACK => Self::LoginAck(LoginAck::get(b)),
            kind::LOGIN_REDIRECT => Self::LoginRedirect(LoginRedirect::get(b)),
            kind::LOGIN_FORCE => Self::LoginForce,
            kind::CHANNEL_CREATE => Self::ChannelCreate(ChannelCreate::get(b)),
            kind::CHANNEL_ACCEPT => Self::ChannelAccept(ChannelAccept::get(b)),
            kind::CHANNEL_SEND => Self::ChannelSend(ChannelSend::get(b)),
            kind::CHANNEL_CLOSE => Self::ChannelClose(ChannelClose::get(b)),
            kind::ONE_TIME => Self::OneTime(OneTime::get(b)),
            kind::STATUS => Self::Status(StatusMsg { status: common::Status::get(b) }),
            kind::PRIVACY => Self::Privacy(PrivacyMsg { privacy: common::Privacy::get(b) }),
            kind::SENSE_SERVICE => Self::SenseService(SenseService { service: b.get_u32() }),
            kind::ADMIN => Self::Admin(Admin { text: b.get_str() }),
            kind::ANNOUNCE => Self::Announce(Announce::get(b)),
            other => return Err(Error::UnknownKind { kind: other }),
        };
        Ok(body)
    }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

/// Client handshake announcing the protocol version and client type.
///
/// The body repeats the head's channel id as a `u32`. For protocol
/// version ≥ (0x001e, 0x001d) an additional tail is present; older
/// peers omit it and the version gate keeps the read symmetric.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Handshake {
    /// Client's major protocol version.
    pub major: u16,
    /// Client's minor protocol version.
    pub minor: u16,
    /// Address as calculated by the server (zero from the client).
    pub srvrcalc_addr: u32,
    /// Client type code.
    pub client_type: u16,
    /// Locally calculated public address.
    pub loclcalc_addr: u32,
    /// Tail: unknown, normally 0x0100.
    pub unknown_a: u16,
    /// Tail: unknown, normally zero.
    pub unknown_b: u32,
    /// Tail: name of the client host.
    pub local_host: String,
}

impl Handshake {
    /// True when the version pair carries the extended handshake tail.
    fn has_tail(major: u16, minor: u16) -> bool {
        major >= 0x001e && minor >= 0x001d
    }

    fn put(&self, head: &Head, b: &mut PutBuffer) {
        b.put_u16(self.major);
        b.put_u16(self.minor);
        b.put_u32(head.channel);
        b.put_u32(self.srvrcalc_addr);
        b.put_u16(self.client_type);
        b.put_u32(self.loclcalc_addr);
        if Self::has_tail(self.major, self.minor) {
            b.put_u16(self.unknown_a);
            b.put_u32(self.unknown_b);
            b.put_str(&self.local_host);
        }
    }

    fn get(head: &mut Head, b: &mut GetBuffer) -> Handshake {
        let mut msg = Handshake::default();
        msg.major = b.get_u16();
        msg.minor = b.get_u16();
        head.channel = b.get_u32();
        msg.srvrcalc_addr = b.get_u32();
        msg.client_type = b.get_u16();
        msg.loclcalc_addr = b.get_u32();
        if Self::has_tail(msg.major, msg.minor) {
            msg.unknown_a = b.get_u16();
            msg.unknown_b = b.get_u32();
            msg.local_host = b.get_str();
        }
        msg
    }
}

// ─── HandshakeAck ────────────────────────────────────────────────────────────

/// Server reply to the handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandshakeAck {
    /// Server's major protocol version.
    pub major: u16,
    /// Server's minor protocol version.
    pub minor: u16,
    /// The client address as seen by the server.
    pub srvrcalc_addr: u32,
    /// Magic value fed back during DH-RC2 authentication.
    pub magic: u32,
    /// Server's DH public key for authentication; may be empty.
    pub data: Opaque,
}

impl HandshakeAck {
    fn has_tail(major: u16, minor: u16) -> bool {
        major >= 0x1e && minor > 0x18
    }

    fn put(&self, b: &mut PutBuffer) {
        b.put_u16(self.major);
        b.put_u16(self.minor);
        b.put_u32(self.srvrcalc_addr);
        if Self::has_tail(self.major, self.minor) {
            b.put_u32(self.magic);
            b.put_opaque(&self.data);
        }
    }

    fn get(b: &mut GetBuffer) -> HandshakeAck {
        let mut msg = HandshakeAck::default();
        msg.major = b.get_u16();
        msg.minor = b.get_u16();
        msg.srvrcalc_addr = b.get_u32();
        if Self::has_tail(msg.major, msg.minor) {
            msg.magic = b.get_u32();
            msg.data = b.get_opaque();
        }
        msg
    }
}

// ─── Login ───────────────────────────────────────────────────────────────────

/// Login request. Note the wire order: the auth data opaque precedes the
/// auth type, and a trailing `u16` zero is written but never read back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Login {
    /// Client type code.
    pub client_type: u16,
    /// User identification.
    pub name: String,
    /// Authentication scheme, see [`crate::codes::auth`].
    pub auth_type: u16,
    /// Scheme-specific authentication data.
    pub auth_data: Opaque,
}

impl Login {
    fn put(&self, b: &mut PutBuffer) {
        b.put_u16(self.client_type);
        b.put_str(&self.name);
        b.put_opaque(&self.auth_data);
        b.put_u16(self.auth_type);
        b.put_u16(0x0000);
    }

    fn get(b: &mut GetBuffer) -> Login {
        Login {
            client_type: b.get_u16(),
            name: b.get_str(),
            auth_data: b.get_opaque(),
            auth_type: b.get_u16(),
        }
    }
}

// ─── LoginAck ────────────────────────────────────────────────────────────────

/// Server acknowledgement of a successful login.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginAck {
    /// The server's view of this login.
    pub login: common::Login,
    /// Current privacy list.
    pub privacy: common::Privacy,
    /// Current status.
    pub status: common::Status,
}

impl LoginAck {
    fn put(&self, b: &mut PutBuffer) {
        self.login.put(b);
        b.put_u16(0x0000);
        self.privacy.put(b);
        self.status.put(b);
    }

    fn get(b: &mut GetBuffer) -> LoginAck {
        let login = common::Login::get(b);
        b.get_u16(); // junk between login and privacy
        LoginAck {
            login,
            privacy: common::Privacy::get(b),
            status: common::Status::get(b),
        }
    }
}

// ─── LoginRedirect ───────────────────────────────────────────────────────────

/// Server instruction to log in against a different host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginRedirect {
    /// Host to reconnect to.
    pub host: String,
    /// Identifier of the redirecting server.
    pub server_id: String,
}

impl LoginRedirect {
    fn put(&self, b: &mut PutBuffer) {
        b.put_str(&self.host);
        b.put_str(&self.server_id);
    }

    fn get(b: &mut GetBuffer) -> LoginRedirect {
        LoginRedirect { host: b.get_str(), server_id: b.get_str() }
    }
}

// ─── Channel create / accept ─────────────────────────────────────────────────

/// One offered or accepted cipher entry in a channel negotiation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncItem {
    /// Cipher identifier.
    pub cipher: u16,
    /// Cipher-specific side information (e.g. a DH public key).
    pub info: Opaque,
}

impl EncItem {
    fn put(&self, b: &mut PutBuffer) {
        b.put_u16(self.cipher);
        b.put_opaque(&self.info);
    }

    fn get(b: &mut GetBuffer) -> EncItem {
        EncItem { cipher: b.get_u16(), info: b.get_opaque() }
    }
}

/// Request to open a channel, carrying the encryption offer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelCreate {
    /// Reserved, normally zero.
    pub reserved: u32,
    /// Intended id for the new channel.
    pub channel: u32,
    /// Target user of the channel.
    pub target: Identity,
    /// Service id the channel belongs to.
    pub service: u32,
    /// Service protocol type.
    pub proto_type: u32,
    /// Service protocol version.
    pub proto_ver: u32,
    /// Channel options, normally zero.
    pub options: u32,
    /// Service-specific additional data.
    pub addtl: Opaque,
    /// Creator login record, when the creator flag is set.
    pub creator: Option<common::Login>,
    /// Offered encryption mode (a policy value).
    pub enc_mode: u16,
    /// Offered cipher entries.
    pub enc_items: Vec<EncItem>,
    /// Echo of the offered mode.
    pub enc_extra: u16,
    /// Unknown negotiation flag.
    pub enc_flag: bool,
}

impl ChannelCreate {
    fn put(&self, b: &mut PutBuffer) {
        b.put_u32(self.reserved);
        b.put_u32(self.channel);
        self.target.put(b);
        b.put_u32(self.service);
        b.put_u32(self.proto_type);
        b.put_u32(self.proto_ver);
        b.put_u32(self.options);
        b.put_opaque(&self.addtl);
        b.put_bool(self.creator.is_some());
        if let Some(creator) = &self.creator {
            creator.put(b);
        }

        b.put_u16(self.enc_mode);
        if self.enc_mode != 0 && !self.enc_items.is_empty() {
            // the item list is wrapped in its own opaque on the wire
            let mut p = PutBuffer::new();
            p.put_u32(self.enc_items.len() as u32);
            for item in &self.enc_items {
                item.put(&mut p);
            }
            p.put_u16(self.enc_extra);
            p.put_bool(self.enc_flag);
            b.put_opaque(&p.into_opaque());
        }

        b.put_u16(0x0007);
    }

    fn get(b: &mut GetBuffer) -> ChannelCreate {
        let mut msg = ChannelCreate::default();
        msg.reserved = b.get_u32();
        msg.channel = b.get_u32();
        msg.target = Identity::get(b);
        msg.service = b.get_u32();
        msg.proto_type = b.get_u32();
        msg.proto_ver = b.get_u32();
        msg.options = b.get_u32();
        msg.addtl = b.get_opaque();
        if b.get_bool() {
            msg.creator = Some(common::Login::get(b));
        }

        msg.enc_mode = b.get_u16();
        b.skip(4); // length of the wrapping opaque; contents read inline
        if msg.enc_mode != 0 {
            let count = b.get_u32();
            for _ in 0..count {
                if b.error() {
                    break;
                }
                msg.enc_items.push(EncItem::get(b));
            }
            msg.enc_extra = b.get_u16();
            msg.enc_flag = b.get_bool();
        }
        msg
    }
}

/// Acceptance of an offered channel, carrying the single chosen cipher.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelAccept {
    /// Service id the channel belongs to.
    pub service: u32,
    /// Service protocol type.
    pub proto_type: u32,
    /// Service protocol version.
    pub proto_ver: u32,
    /// Service-specific additional data.
    pub addtl: Opaque,
    /// Acceptor login record, when the acceptor flag is set.
    pub acceptor: Option<common::Login>,
    /// Accepted encryption mode (policy of the chosen cipher, or none).
    pub enc_mode: u16,
    /// The chosen cipher entry; meaningful only when `enc_mode` is
    /// non-zero.
    pub enc_item: EncItem,
    /// The originally offered mode.
    pub enc_extra: u16,
    /// Unknown negotiation flag.
    pub enc_flag: bool,
}

impl ChannelAccept {
    fn put(&self, b: &mut PutBuffer) {
        b.put_u32(self.service);
        b.put_u32(self.proto_type);
        b.put_u32(self.proto_ver);
        b.put_opaque(&self.addtl);
        b.put_bool(self.acceptor.is_some());
        if let Some(acceptor) = &self.acceptor {
            acceptor.put(b);
        }

        b.put_u16(self.enc_mode);
        if self.enc_mode != 0 {
            let mut p = PutBuffer::new();
            self.enc_item.put(&mut p);
            p.put_u16(self.enc_extra);
            p.put_bool(self.enc_flag);
            b.put_opaque(&p.into_opaque());
        }

        b.put_u16(0x0007);
    }

    fn get(b: &mut GetBuffer) -> ChannelAccept {
        let mut msg = ChannelAccept::default();
        msg.service = b.get_u32();
        msg.proto_type = b.get_u32();
        msg.proto_ver = b.get_u32();
        msg.addtl = b.get_opaque();
        if b.get_bool() {
            msg.acceptor = Some(common::Login::get(b));
        }

        msg.enc_mode = b.get_u16();
        b.skip(4);
        if msg.enc_mode != 0 {
            msg.enc_item = EncItem::get(b);
            msg.enc_extra = b.get_u16();
            msg.enc_flag = b.get_bool();
        }
        msg
    }
}

// ─── Channel send / close ────────────────────────────────────────────────────

/// Service data on an open channel. The payload is ciphertext when the
/// head carries [`option::ENCRYPT`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelSend {
    /// Service-defined send type; ids are only unique per service.
    pub kind: u16,
    /// Service payload, possibly encrypted.
    pub data: Opaque,
}

impl ChannelSend {
    fn put(&self, b: &mut PutBuffer) {
        b.put_u16(self.kind);
        b.put_opaque(&self.data);
    }

    fn get(b: &mut GetBuffer) -> ChannelSend {
        ChannelSend { kind: b.get_u16(), data: b.get_opaque() }
    }
}

/// Channel shutdown, from either side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelClose {
    /// Reason code; non-zero reports an error.
    pub reason: u32,
    /// Additional close information.
    pub data: Opaque,
}

impl ChannelClose {
    fn put(&self, b: &mut PutBuffer) {
        b.put_u32(self.reason);
        b.put_opaque(&self.data);
    }

    fn get(b: &mut GetBuffer) -> ChannelClose {
        ChannelClose { reason: b.get_u32(), data: b.get_opaque() }
    }
}

// ─── OneTime ─────────────────────────────────────────────────────────────────

/// A single service datagram sent without opening a channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OneTime {
    /// Sender-assigned id of the datagram.
    pub id: u32,
    /// Target user.
    pub target: Identity,
    /// Service id.
    pub service: u32,
    /// Service protocol type.
    pub proto_type: u32,
    /// Service protocol version.
    pub proto_ver: u32,
    /// Service-defined send type.
    pub kind: u16,
    /// Service payload.
    pub data: Opaque,
}

impl OneTime {
    fn put(&self, b: &mut PutBuffer) {
        b.put_u32(self.id);
        self.target.put(b);
        b.put_u32(self.service);
        b.put_u32(self.proto_type);
        b.put_u32(self.proto_ver);
        b.put_u16(self.kind);
        b.put_opaque(&self.data);
    }

    fn get(b: &mut GetBuffer) -> OneTime {
        let mut msg = OneTime::default();
        msg.id = b.get_u32();
        msg.target = Identity::get(b);
        msg.service = b.get_u32();
        msg.proto_type = b.get_u32();
        msg.proto_ver = b.get_u32();
        msg.kind = b.get_u16();
        msg.data = b.get_opaque();
        msg
    }
}

// ─── Status / Privacy / SenseService / Admin ─────────────────────────────────

/// Status report message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusMsg {
    /// The reported status.
    pub status: common::Status,
}

/// Privacy list message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrivacyMsg {
    /// The reported privacy list.
    pub privacy: common::Privacy,
}

/// Probe for (or answer about) the presence of a service by id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SenseService {
    /// The service id in question.
    pub service: u32,
}

/// Administrative broadcast message from the server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Admin {
    /// The broadcast text.
    pub text: String,
}

// ─── Announce ────────────────────────────────────────────────────────────────

/// An announcement between users.
///
/// Recipient entries use the form `@U user` for users and `@G group`
/// for notes-address-book groups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Announce {
    /// Sender login record, when present.
    pub sender: Option<common::Login>,
    /// Unknown, usually zero.
    pub unknown_a: u16,
    /// Whether replies are allowed.
    pub may_reply: bool,
    /// The announcement text.
    pub text: String,
    /// Recipient specifications.
    pub recipients: Vec<String>,
}

impl Announce {
    fn put(&self, b: &mut PutBuffer) {
        b.put_bool(self.sender.is_some());
        if let Some(sender) = &self.sender {
            sender.put(b);
        }
        b.put_u16(self.unknown_a);

        // reply flag and text ride inside their own opaque
        let mut p = PutBuffer::new();
        p.put_bool(self.may_reply);
        p.put_str(&self.text);
        b.put_opaque(&p.into_opaque());

        b.put_u32(self.recipients.len() as u32);
        for rcpt in &self.recipients {
            b.put_str(rcpt);
        }
    }

    fn get(b: &mut GetBuffer) -> Announce {
        let mut msg = Announce::default();
        if b.get_bool() {
            msg.sender = Some(common::Login::get(b));
        }
        msg.unknown_a = b.get_u16();

        let wrapped = b.get_opaque();
        let mut inner = GetBuffer::wrap(wrapped.as_slice());
        msg.may_reply = inner.get_bool();
        msg.text = inner.get_str();

        let count = b.get_u32();
        for _ in 0..count {
            if b.error() {
                break;
            }
            msg.recipients.push(b.get_str());
        }
        msg
    }
}
