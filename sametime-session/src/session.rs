//! The top-level session state machine.
//!
//! A session speaks to exactly one server connection, but owns no
//! socket: the embedder pushes received bytes in with
//! [`Session::feed`] and pulls rendered frames out with
//! [`Session::flush`] whenever the transport is writable. A
//! [`SessionEvent::Pending`] event signals that there is something to
//! flush.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};
use sametime_codec::codes::{auth, client, error};
use sametime_codec::message::{self, Body, Handshake, HandshakeAck, Message, OneTime};
use sametime_codec::{GetBuffer, Identity, Login, Opaque, Privacy, PutBuffer, Status};
use sametime_crypto::{dh, rc2};

use crate::channel::Channel;
use crate::cipher::{CipherClass, CipherError, CipherRegistry};
use crate::event::SessionEvent;
use crate::parser::Parser;
use crate::queue::{FrameQueue, MetaQueue};

/// Default protocol major version announced at handshake.
pub const PROTOCOL_VERSION_MAJOR: u16 = 0x001e;
/// Default protocol minor version announced at handshake.
pub const PROTOCOL_VERSION_MINOR: u16 = 0x001d;
/// Id of the master channel; a close on it terminates the session.
pub const MASTER_CHANNEL: u32 = 0x0000_0000;

/// Outgoing channel ids wrap below this bound; the high bit marks
/// server-assigned ids.
const CHANNEL_ID_MODULUS: u32 = 0x8000_0000;

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Not started, or terminally stopped.
    Stopped,
    /// Start requested; handshake being composed.
    Starting,
    /// Handshake sent.
    Handshake,
    /// Handshake acknowledged by the server.
    HandshakeAck,
    /// Login sent.
    Login,
    /// Server redirected the login to another host.
    LoginRedirect,
    /// Login continuation sent despite the redirect.
    LoginForce,
    /// Login acknowledged.
    LoginAck,
    /// Fully started; channels may be opened.
    Started,
    /// Stop in progress.
    Stopping,
}

impl SessionState {
    /// True during the handshake/login phases, where a session-level
    /// parse failure is fatal.
    fn in_login_phase(self) -> bool {
        matches!(
            self,
            Self::Starting
                | Self::Handshake
                | Self::HandshakeAck
                | Self::Login
                | Self::LoginRedirect
                | Self::LoginForce
                | Self::LoginAck
        )
    }
}

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors returned by session operations misused by the embedder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// No channel is registered under the given id.
    NoSuchChannel {
        /// The unknown channel id.
        id: u32,
    },
    /// The operation is not valid in the session's current state.
    InvalidState {
        /// The state the session was in.
        state: SessionState,
    },
    /// The channel is not in a state that allows the operation.
    InvalidChannelState {
        /// The channel id.
        id: u32,
    },
    /// A channel cipher refused the operation.
    Cipher(CipherError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchChannel { id } => write!(f, "no channel with id {id:#010x}"),
            Self::InvalidState { state } => {
                write!(f, "operation not valid in session state {state:?}")
            }
            Self::InvalidChannelState { id } => {
                write!(f, "channel {id:#010x} is not in a state for that")
            }
            Self::Cipher(err) => write!(f, "cipher: {err}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CipherError> for SessionError {
    fn from(err: CipherError) -> Self {
        Self::Cipher(err)
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Connection parameters, set before [`Session::start`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// User id to authenticate as.
    pub auth_user: String,
    /// Authentication scheme, see [`sametime_codec::codes::auth`].
    pub auth_type: u16,
    /// Password for the plain/RC2/DH-RC2 schemes.
    pub auth_password: String,
    /// Token for the token scheme.
    pub auth_token: Option<Opaque>,
    /// Client type code announced at handshake and login.
    pub client_type: u16,
    /// Name of the client host, sent in the handshake tail.
    pub client_host: String,
    /// Protocol major version to announce.
    pub client_ver_major: u16,
    /// Protocol minor version to announce.
    pub client_ver_minor: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_user: String::new(),
            auth_type: auth::DH_RC2,
            auth_password: String::new(),
            auth_token: None,
            client_type: client::LIBRARY,
            client_host: String::new(),
            client_ver_major: PROTOCOL_VERSION_MAJOR,
            client_ver_minor: PROTOCOL_VERSION_MINOR,
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// Claim handler for incoming channels; returning true keeps the
/// channel alive for a service to accept or reject later.
type ChannelHandler = Box<dyn FnMut(&mut Channel) -> bool>;

/// A client session with a community server.
pub struct Session {
    state: SessionState,
    config: SessionConfig,

    login: Login,
    privacy: Privacy,
    status: Status,
    redirect_host: Option<String>,
    server_major: u16,
    server_minor: u16,

    parser: Parser,
    queue: FrameQueue,
    chan_queue: MetaQueue,

    channel_counter: u32,
    channels: HashMap<u32, Channel>,
    ciphers: CipherRegistry,

    events: VecDeque<SessionEvent>,
    channel_handler: Option<ChannelHandler>,
}

impl Session {
    /// Create a stopped session with the built-in ciphers registered.
    pub fn new(config: SessionConfig) -> Session {
        Session {
            state: SessionState::Stopped,
            config,
            login: Login::default(),
            privacy: Privacy::default(),
            status: Status::default(),
            redirect_host: None,
            server_major: 0,
            server_minor: 0,
            parser: Parser::new(),
            queue: FrameQueue::default(),
            chan_queue: MetaQueue::default(),
            channel_counter: 0,
            channels: HashMap::new(),
            ciphers: CipherRegistry::builtin(),
            events: VecDeque::new(),
            channel_handler: None,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The server's view of our login, populated at login ack.
    pub fn login(&self) -> &Login {
        &self.login
    }

    /// Current privacy record.
    pub fn privacy(&self) -> &Privacy {
        &self.privacy
    }

    /// Current status record.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Redirect target, populated while in the login-redirect state.
    pub fn redirect_host(&self) -> Option<&str> {
        self.redirect_host.as_deref()
    }

    /// Server protocol version recorded from the handshake ack.
    pub fn server_version(&self) -> (u16, u16) {
        (self.server_major, self.server_minor)
    }

    /// Look up a channel by id.
    pub fn channel(&self, id: u32) -> Option<&Channel> {
        self.channels.get(&id)
    }

    /// All live channels, in no particular order.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Count of frames waiting to be flushed.
    pub fn pending(&self) -> usize {
        self.queue.len() + self.chan_queue.len()
    }

    /// Take the next queued event, if any.
    pub fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Install the claim handler consulted for each incoming channel.
    /// Without one (or when it returns false) incoming channels are
    /// rejected with a service-no-support close.
    pub fn set_channel_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Channel) -> bool + 'static,
    {
        self.channel_handler = Some(Box::new(handler));
    }

    /// Register an additional cipher class; false on id/policy
    /// collision.
    pub fn add_cipher(&mut self, class: Rc<dyn CipherClass>) -> bool {
        self.ciphers.add(class)
    }

    /// Unregister a cipher class by id.
    pub fn remove_cipher(&mut self, id: u16) {
        self.ciphers.remove(id)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Start the session: emit the handshake and await the ack.
    pub fn start(&mut self) {
        self.set_state(SessionState::Starting, 0);

        let mut msg = Message::new(Body::Handshake(Handshake {
            major: self.config.client_ver_major,
            minor: self.config.client_ver_minor,
            srvrcalc_addr: 0,
            client_type: self.config.client_type,
            loclcalc_addr: 0,
            unknown_a: 0x0100,
            unknown_b: 0,
            local_host: self.config.client_host.clone(),
        }));
        msg.head.channel = MASTER_CHANNEL;
        self.send_message(&msg);

        self.set_state(SessionState::Handshake, 0);
    }

    /// Stop the session, closing all open channels and discarding all
    /// queued outgoing data. `reason` is surfaced on the terminal state
    /// transitions; transport failures should pass
    /// [`error::CONNECTION_BROKEN`].
    pub fn stop(&mut self, reason: u32) {
        if self.state == SessionState::Stopped {
            return;
        }
        debug!("stopping session: {}", error::describe(reason));

        self.set_state(SessionState::Stopping, reason);

        let open: Vec<u32> = self
            .channels
            .iter()
            .filter(|(_, c)| c.is_open())
            .map(|(id, _)| *id)
            .collect();
        for id in open {
            let _ = self.close_channel(id, 0, &Opaque::new());
        }
        for (id, channel) in self.channels.drain() {
            self.events.push_back(SessionEvent::ChannelClosed {
                channel: id,
                code: channel.close_code(),
                info: channel.close_info().clone(),
            });
        }

        self.queue.clear();
        self.chan_queue.clear();

        self.set_state(SessionState::Stopped, reason);
    }

    fn set_state(&mut self, state: SessionState, info: u32) {
        self.state = state;
        if state != SessionState::LoginRedirect {
            self.redirect_host = None;
        }
        self.events.push_back(SessionEvent::StateChanged { state, info });
    }

    // ─── Outgoing ────────────────────────────────────────────────────────────

    /// Render `msg` with its length prefix and queue it on the session
    /// FIFO.
    pub fn send_message(&mut self, msg: &Message) {
        let frame = frame(msg);
        self.queue.push(frame);
        self.events.push_back(SessionEvent::Pending);
    }

    /// Queue the single-byte keepalive.
    pub fn send_keepalive(&mut self) {
        self.queue.push(vec![0x80]);
        self.events.push_back(SessionEvent::Pending);
    }

    /// Compose and queue an announcement to `recipients`.
    pub fn send_announce(&mut self, may_reply: bool, recipients: &[String], text: &str) {
        let msg = Message::new(Body::Announce(message::Announce {
            sender: None,
            unknown_a: 0,
            may_reply,
            text: text.to_owned(),
            recipients: recipients.to_vec(),
        }));
        self.send_message(&msg);
    }

    /// Compose and queue a one-time service datagram.
    pub fn send_one_time(&mut self, one_time: OneTime) {
        self.send_message(&Message::new(Body::OneTime(one_time)));
    }

    /// Ask the server whether a service is present.
    pub fn sense_service(&mut self, service: u32) {
        let msg = Message::new(Body::SenseService(message::SenseService { service }));
        self.send_message(&msg);
    }

    /// Publish a new status for this login.
    pub fn set_status(&mut self, status: &Status) {
        let msg = Message::new(Body::Status(message::StatusMsg { status: status.clone() }));
        self.send_message(&msg);
    }

    /// Publish a new privacy list for this login.
    pub fn set_privacy(&mut self, privacy: &Privacy) {
        let msg = Message::new(Body::Privacy(message::PrivacyMsg { privacy: privacy.clone() }));
        self.send_message(&msg);
    }

    /// Continue a redirected login on this connection instead of
    /// following the redirect.
    pub fn force_login(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::LoginRedirect {
            return Err(SessionError::InvalidState { state: self.state });
        }
        self.send_message(&Message::new(Body::LoginForce));
        self.set_state(SessionState::LoginForce, 0);
        Ok(())
    }

    /// Pull the next rendered frame for the transport: one session
    /// frame if any, otherwise one channel frame in round-robin order.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        self.queue.next().or_else(|| self.chan_queue.next())
    }

    fn queue_channel_frame(&mut self, channel: u32, msg: &Message) {
        let frame = frame(msg);
        self.chan_queue.push(channel, frame);
        self.events.push_back(SessionEvent::Pending);
    }

    // ─── Channels ────────────────────────────────────────────────────────────

    /// Allocate a new outgoing channel. The id counter only increases,
    /// modulo 2³¹.
    pub fn new_channel(
        &mut self,
        target: Identity,
        service: u32,
        proto_type: u32,
        proto_ver: u32,
        policy: u16,
    ) -> u32 {
        self.channel_counter = (self.channel_counter + 1) % CHANNEL_ID_MODULUS;
        let id = self.channel_counter;
        let channel = Channel::outgoing(id, target, service, proto_type, proto_ver, policy);
        self.channels.insert(id, channel);
        id
    }

    /// Open a channel: send the create for an outgoing channel, or the
    /// accept for a pending incoming one.
    pub fn open_channel(&mut self, id: u32, info: &Opaque) -> Result<(), SessionError> {
        let Some(channel) = self.channels.get_mut(&id) else {
            return Err(SessionError::NoSuchChannel { id });
        };
        let msg = channel.open(info, &self.ciphers, &self.login.login_id);
        match msg {
            Some(msg) => {
                self.queue_channel_frame(id, &msg);
                Ok(())
            }
            None => Err(SessionError::InvalidChannelState { id }),
        }
    }

    /// Close a channel, sending the close message. Closing an already
    /// terminal channel is a no-op.
    pub fn close_channel(&mut self, id: u32, code: u32, info: &Opaque) -> Result<(), SessionError> {
        let Some(channel) = self.channels.get_mut(&id) else {
            return Err(SessionError::NoSuchChannel { id });
        };
        if let Some(msg) = channel.close(code, info) {
            self.queue_channel_frame(id, &msg);
            let channel = self.channels.remove(&id);
            if let Some(channel) = channel {
                self.events.push_back(SessionEvent::ChannelClosed {
                    channel: id,
                    code: channel.close_code(),
                    info: channel.close_info().clone(),
                });
            }
        }
        Ok(())
    }

    /// Send service data on an open channel.
    pub fn channel_send(
        &mut self,
        id: u32,
        kind: u16,
        data: &[u8],
        encrypt: bool,
    ) -> Result<(), SessionError> {
        let Some(channel) = self.channels.get_mut(&id) else {
            return Err(SessionError::NoSuchChannel { id });
        };
        let msg = channel.send(kind, data, encrypt)?;
        self.queue_channel_frame(id, &msg);
        Ok(())
    }

    // ─── Incoming ────────────────────────────────────────────────────────────

    /// Feed bytes received from the transport. Completed messages are
    /// dispatched as they assemble.
    pub fn feed(&mut self, data: &[u8]) {
        let mut parser = std::mem::take(&mut self.parser);
        let mut frames: Vec<Vec<u8>> = Vec::new();
        parser.feed(data, |frame| frames.push(frame.to_vec()));
        self.parser = parser;
        for frame in frames {
            self.dispatch(&frame);
        }
    }

    fn dispatch(&mut self, frame: &[u8]) {
        let mut buffer = GetBuffer::wrap(frame);
        let msg = match Message::get(&mut buffer) {
            Ok(msg) => msg,
            Err(err) => {
                warn!("dropping message of {} bytes: {err}", frame.len());
                if self.state.in_login_phase() {
                    self.stop(error::FAILURE);
                }
                return;
            }
        };

        match msg.body {
            Body::HandshakeAck(ack) => self.recv_handshake_ack(&ack),
            Body::LoginRedirect(redirect) => self.recv_login_redirect(redirect),
            Body::LoginAck(ack) => self.recv_login_ack(ack),
            Body::ChannelCreate(create) => self.recv_channel_create(&create),
            Body::ChannelAccept(accept) => self.recv_channel_accept(msg.head.channel, &accept),
            Body::ChannelClose(close) => self.recv_channel_close(msg.head.channel, &close),
            Body::ChannelSend(send) => {
                self.recv_channel_send(msg.head.channel, msg.head.options, &send)
            }
            Body::Status(status) => {
                self.status = status.status;
                self.events.push_back(SessionEvent::GotStatus);
            }
            Body::Privacy(privacy) => {
                self.privacy = privacy.privacy;
                self.events.push_back(SessionEvent::GotPrivacy);
            }
            Body::SenseService(sense) => {
                self.events.push_back(SessionEvent::SenseService { service: sense.service });
            }
            Body::Admin(admin) => {
                self.events.push_back(SessionEvent::Admin { text: admin.text });
            }
            Body::Announce(announce) => {
                self.events.push_back(SessionEvent::Announce {
                    may_reply: announce.may_reply,
                    sender: announce.sender,
                    text: announce.text,
                });
            }
            other => {
                debug!("ignoring unrouted message type {:#06x}", other.kind());
            }
        }
    }

    fn recv_handshake_ack(&mut self, ack: &HandshakeAck) {
        if self.state != SessionState::Handshake {
            warn!("handshake ack in state {:?}, ignoring", self.state);
            return;
        }

        self.server_major = ack.major;
        self.server_minor = ack.minor;
        self.set_state(SessionState::HandshakeAck, 0);

        let mut login = message::Login {
            client_type: self.config.client_type,
            name: self.config.auth_user.clone(),
            auth_type: self.config.auth_type,
            auth_data: Opaque::new(),
        };

        match self.config.auth_type {
            auth::PLAIN => login.auth_data = self.compose_auth_plain(),
            auth::TOKEN => login.auth_data = self.compose_auth_token(),
            auth::RC2 => login.auth_data = self.compose_auth_rc2(),
            auth::DH_RC2 => self.compose_auth_dh_rc2(ack, &mut login),
            unknown => warn!("unknown session auth type {unknown:#06x}"),
        }

        self.send_message(&Message::new(Body::Login(login)));
        self.set_state(SessionState::Login, 0);
    }

    fn compose_auth_plain(&self) -> Opaque {
        let mut b = PutBuffer::new();
        b.put_str(&self.config.auth_password);
        b.into_opaque()
    }

    fn compose_auth_token(&self) -> Opaque {
        match &self.config.auth_token {
            Some(token) => token.clone(),
            None => {
                warn!("token authentication selected without a token");
                Opaque::new()
            }
        }
    }

    /// Password encrypted under a random 40-bit key; the key itself
    /// rides alongside the ciphertext.
    fn compose_auth_rc2(&self) -> Opaque {
        let mut key = [0u8; 5];
        getrandom::getrandom(&mut key).expect("getrandom");

        let cipher = rc2::encrypt(&key, self.config.auth_password.as_bytes());

        let mut b = PutBuffer::new();
        b.put_opaque(&Opaque::from(key.as_slice()));
        b.put_opaque(&Opaque::from(cipher));
        b.into_opaque()
    }

    /// Password encrypted under the DH shared secret. Downgrades to the
    /// RC2 scheme when the server offered no public key.
    fn compose_auth_dh_rc2(&self, ack: &HandshakeAck, login: &mut message::Login) {
        if ack.data.is_empty() {
            debug!("no server public key offered, falling back to RC2 authentication");
            login.auth_type = auth::RC2;
            login.auth_data = self.compose_auth_rc2();
            return;
        }

        let mut plain = PutBuffer::new();
        plain.put_u32(ack.magic);
        plain.put_str(&self.config.auth_password);

        let keys = dh::Keypair::generate();
        let secret = keys.shared_secret(&dh::import(ack.data.as_slice()));
        let secret_bytes = dh::export(&secret);
        let key = &secret_bytes[secret_bytes.len().saturating_sub(16)..];
        let cipher = rc2::encrypt(key, &plain.into_vec());

        let mut b = PutBuffer::new();
        b.put_u16(0x0001);
        b.put_opaque(&Opaque::from(dh::export(keys.public())));
        b.put_opaque(&Opaque::from(cipher));
        login.auth_data = b.into_opaque();
    }

    fn recv_login_redirect(&mut self, redirect: message::LoginRedirect) {
        if self.state != SessionState::Login {
            warn!("login redirect in state {:?}, ignoring", self.state);
            return;
        }
        self.set_state(SessionState::LoginRedirect, 0);
        self.redirect_host = Some(redirect.host);
    }

    fn recv_login_ack(&mut self, ack: message::LoginAck) {
        if self.state != SessionState::Login && self.state != SessionState::LoginForce {
            warn!("login ack in state {:?}, ignoring", self.state);
            return;
        }

        self.login = ack.login;
        self.privacy = ack.privacy;
        self.status = ack.status;
        self.events.push_back(SessionEvent::GotStatus);
        self.events.push_back(SessionEvent::GotPrivacy);

        self.set_state(SessionState::LoginAck, 0);
        self.set_state(SessionState::Started, 0);
    }

    fn recv_channel_create(&mut self, create: &message::ChannelCreate) {
        let id = create.channel;
        let channel = Channel::incoming(create, &self.ciphers, &self.login.login_id);
        self.channels.insert(id, channel);

        let mut handler = self.channel_handler.take();
        let wanted = match (&mut handler, self.channels.get_mut(&id)) {
            (Some(handler), Some(channel)) => handler(channel),
            _ => false,
        };
        self.channel_handler = handler;

        if !wanted {
            let _ = self.close_channel(id, error::SERVICE_NO_SUPPORT, &Opaque::new());
        }
    }

    fn recv_channel_accept(&mut self, id: u32, accept: &message::ChannelAccept) {
        let Some(channel) = self.channels.get_mut(&id) else {
            warn!("accept for unknown channel {id:#010x}");
            return;
        };
        match channel.feed_accept(accept, &self.login.login_id) {
            Ok(()) => self.events.push_back(SessionEvent::ChannelOpened { channel: id }),
            Err(code) => {
                let _ = self.close_channel(id, code, &Opaque::new());
            }
        }
    }

    fn recv_channel_close(&mut self, id: u32, close: &message::ChannelClose) {
        if id == MASTER_CHANNEL {
            self.stop(close.reason);
            return;
        }

        let Some(channel) = self.channels.get_mut(&id) else {
            warn!("close for unknown channel {id:#010x}");
            return;
        };
        channel.feed_close(close);
        if let Some(channel) = self.channels.remove(&id) {
            self.events.push_back(SessionEvent::ChannelClosed {
                channel: id,
                code: channel.close_code(),
                info: channel.close_info().clone(),
            });
        }
    }

    fn recv_channel_send(&mut self, id: u32, options: u16, send: &message::ChannelSend) {
        let Some(channel) = self.channels.get_mut(&id) else {
            warn!("data for unknown channel {id:#010x}");
            return;
        };
        if let Some((kind, data)) = channel.feed_send(options, send) {
            self.events.push_back(SessionEvent::ChannelData { channel: id, kind, data });
        }
    }
}

/// Render a message behind its 4-byte length prefix.
fn frame(msg: &Message) -> Vec<u8> {
    let body = msg.encode();
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}
