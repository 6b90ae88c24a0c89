use sametime_codec::codes::{auth, error, policy};
use sametime_codec::common::{Identity, Login, Opaque, Privacy, Status};
use sametime_codec::message::{
    Body, ChannelAccept, ChannelClose, ChannelSend, EncItem, HandshakeAck, LoginAck, Message,
};
use sametime_session::{Session, SessionConfig, SessionEvent, SessionState};

/// Render a server-side message the way it would arrive off the wire.
fn wire(msg: &Message) -> Vec<u8> {
    let body = msg.encode();
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Strip the length prefix from a flushed frame and decode it.
fn decode(frame: &[u8]) -> Message {
    assert!(frame.len() >= 4, "frame shorter than its length prefix");
    let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(len, frame.len() - 4, "length prefix disagrees with frame");
    Message::decode(&frame[4..]).expect("flushed frame must decode")
}

fn drain(session: &mut Session) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = session.next_event() {
        events.push(event);
    }
    events
}

fn states(events: &[SessionEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

fn plain_config() -> SessionConfig {
    SessionConfig {
        auth_user: "carol".into(),
        auth_type: auth::PLAIN,
        auth_password: "hunter2".into(),
        client_host: "workstation".into(),
        ..SessionConfig::default()
    }
}

fn handshake_ack() -> Message {
    Message::new(Body::HandshakeAck(HandshakeAck {
        major: 0x001e,
        minor: 0x001d,
        srvrcalc_addr: 0x0a00_0001,
        magic: 0,
        data: Opaque::new(),
    }))
}

fn login_ack(login_id: &str) -> Message {
    Message::new(Body::LoginAck(LoginAck {
        login: Login {
            id: Identity { user: "carol".into(), community: None },
            name: "Carol".into(),
            login_id: login_id.into(),
            client: 0x1700,
            extra: None,
        },
        privacy: Privacy::default(),
        status: Status { kind: Status::ACTIVE, idle_since: 0, desc: String::new() },
    }))
}

/// Run the whole handshake + login exchange, returning a started
/// session.
fn started_session() -> Session {
    let mut session = Session::new(plain_config());
    session.start();
    session.flush().expect("handshake frame");
    session.feed(&wire(&handshake_ack()));
    session.flush().expect("login frame");
    session.feed(&wire(&login_ack("1830f1a2")));
    assert_eq!(session.state(), SessionState::Started);
    drain(&mut session);
    session
}

// ─── Startup ─────────────────────────────────────────────────────────────────

#[test]
fn handshake_happy_path() {
    let mut session = Session::new(plain_config());
    session.start();
    assert_eq!(session.state(), SessionState::Handshake);

    let frame = session.flush().expect("handshake queued");
    let msg = decode(&frame);
    match msg.body {
        Body::Handshake(hs) => {
            assert_eq!(hs.major, 0x001e);
            assert_eq!(hs.minor, 0x001d);
            assert_eq!(hs.client_type, 0x1700);
            assert_eq!(hs.local_host, "workstation");
        }
        other => panic!("expected handshake, got {other:?}"),
    }

    session.feed(&wire(&handshake_ack()));
    assert_eq!(session.state(), SessionState::Login);
    assert_eq!(session.server_version(), (0x001e, 0x001d));

    let events = drain(&mut session);
    let seen = states(&events);
    assert_eq!(
        seen,
        vec![
            SessionState::Starting,
            SessionState::Handshake,
            SessionState::HandshakeAck,
            SessionState::Login,
        ],
    );

    let frame = session.flush().expect("login queued");
    match decode(&frame).body {
        Body::Login(login) => {
            assert_eq!(login.auth_type, auth::PLAIN);
            assert_eq!(login.name, "carol");
            // plain auth data is the password as a counted string
            assert_eq!(login.auth_data.as_slice(), b"\x00\x07hunter2");
        }
        other => panic!("expected login, got {other:?}"),
    }
}

#[test]
fn dh_auth_downgrades_without_server_key() {
    let mut session = Session::new(SessionConfig {
        auth_type: auth::DH_RC2,
        ..plain_config()
    });
    session.start();
    session.flush().expect("frame queued");
    // ack with an empty key opaque forces the RC2 fallback
    session.feed(&wire(&handshake_ack()));
    let frame = session.flush().expect("login queued");
    match decode(&frame).body {
        Body::Login(login) => assert_eq!(login.auth_type, auth::RC2),
        other => panic!("expected login, got {other:?}"),
    }
}

#[test]
fn dh_auth_uses_the_offered_key() {
    use sametime_crypto::dh;

    let server_keys = dh::Keypair::generate();
    let mut session = Session::new(SessionConfig {
        auth_type: auth::DH_RC2,
        ..plain_config()
    });
    session.start();
    session.flush().expect("frame queued");

    session.feed(&wire(&Message::new(Body::HandshakeAck(HandshakeAck {
        major: 0x001e,
        minor: 0x001d,
        srvrcalc_addr: 0,
        magic: 0x5a5a_0001,
        data: Opaque::from(dh::export(server_keys.public())),
    }))));

    let frame = session.flush().expect("login queued");
    let Body::Login(login) = decode(&frame).body else {
        panic!("expected login");
    };
    assert_eq!(login.auth_type, auth::DH_RC2);

    // the server can recover the password from the auth block
    let mut b = sametime_codec::GetBuffer::wrap(login.auth_data.as_slice());
    assert_eq!(b.get_u16(), 0x0001);
    let client_public = b.get_opaque();
    let ciphertext = b.get_opaque();
    assert!(!b.error());

    let secret = server_keys.shared_secret(&dh::import(client_public.as_slice()));
    let secret_bytes = dh::export(&secret);
    let key = &secret_bytes[secret_bytes.len() - 16..];
    let plain = sametime_crypto::rc2::decrypt(key, ciphertext.as_slice()).expect("decrypt");

    let mut p = sametime_codec::GetBuffer::wrap(&plain);
    assert_eq!(p.get_u32(), 0x5a5a_0001);
    assert_eq!(p.get_str(), "hunter2");
}

#[test]
fn login_ack_starts_the_session() {
    let mut session = started_session();
    assert_eq!(session.login().login_id, "1830f1a2");
    assert_eq!(session.status().kind, Status::ACTIVE);
    assert!(drain(&mut session).is_empty());
}

#[test]
fn login_redirect_then_force() {
    let mut session = Session::new(plain_config());
    session.start();
    session.flush().expect("frame queued");
    session.feed(&wire(&handshake_ack()));
    session.flush().expect("frame queued");

    session.feed(&wire(&Message::new(Body::LoginRedirect(
        sametime_codec::message::LoginRedirect {
            host: "community2.example.com".into(),
            server_id: "srv-2".into(),
        },
    ))));
    assert_eq!(session.state(), SessionState::LoginRedirect);
    assert_eq!(session.redirect_host(), Some("community2.example.com"));

    session.force_login().expect("redirect state allows force login");
    assert_eq!(session.state(), SessionState::LoginForce);
    let frame = session.flush().expect("login continue queued");
    assert!(matches!(decode(&frame).body, Body::LoginForce));

    // the ack after a forced login still starts the session
    session.feed(&wire(&login_ack("1830f1a2")));
    assert_eq!(session.state(), SessionState::Started);
}

#[test]
fn parse_failure_during_login_stops_the_session() {
    let mut session = Session::new(plain_config());
    session.start();
    session.flush().expect("frame queued");
    // a frame that cannot possibly hold a handshake ack
    session.feed(&[0, 0, 0, 2, 0x80, 0x00]);
    assert_eq!(session.state(), SessionState::Stopped);
    let events = drain(&mut session);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::StateChanged { state: SessionState::Stopped, info } if *info == error::FAILURE
    )));
}

#[test]
fn parse_failure_when_started_is_dropped() {
    let mut session = started_session();
    session.feed(&[0, 0, 0, 2, 0x00, 0xf0]);
    assert_eq!(session.state(), SessionState::Started);
}

// ─── Channels ────────────────────────────────────────────────────────────────

#[test]
fn channel_ids_increase_from_one() {
    let mut session = started_session();
    let target = Identity { user: "dave".into(), community: None };
    let a = session.new_channel(target.clone(), 1, 1, 1, policy::NONE);
    let b = session.new_channel(target.clone(), 1, 1, 1, policy::NONE);
    let c = session.new_channel(target, 1, 1, 1, policy::NONE);
    assert_eq!((a, b, c), (1, 2, 3));
}

#[test]
fn channel_close_with_error_reason_propagates() {
    let mut session = started_session();
    let target = Identity { user: "dave".into(), community: None };
    let id = session.new_channel(target, 0x11, 0x10, 2, policy::NONE);
    session.open_channel(id, &Opaque::new()).expect("open");
    let frame = session.flush().expect("create queued");
    assert!(matches!(decode(&frame).body, Body::ChannelCreate(_)));

    let mut accept = Message::new(Body::ChannelAccept(ChannelAccept::default()));
    accept.head.channel = id;
    session.feed(&wire(&accept));
    assert!(session.channel(id).expect("channel live").is_open());
    drain(&mut session);

    let mut close = Message::new(Body::ChannelClose(ChannelClose {
        reason: 0x8000_0001,
        data: Opaque::new(),
    }));
    close.head.channel = id;
    session.feed(&wire(&close));

    // channel is gone, its error surfaced, and the session is unharmed
    assert!(session.channel(id).is_none());
    assert_eq!(session.state(), SessionState::Started);
    let events = drain(&mut session);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ChannelClosed { channel, code, .. }
            if *channel == id && *code == 0x8000_0001
    )));
}

#[test]
fn master_channel_close_stops_the_session() {
    let mut session = started_session();
    let mut close = Message::new(Body::ChannelClose(ChannelClose {
        reason: error::CONNECTION_BROKEN,
        data: Opaque::new(),
    }));
    close.head.channel = 0;
    session.feed(&wire(&close));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn unclaimed_incoming_channel_is_rejected() {
    let mut session = started_session();
    let create = Message::new(Body::ChannelCreate(sametime_codec::message::ChannelCreate {
        channel: 0x8000_0004,
        target: Identity { user: "carol".into(), community: None },
        service: 0x11,
        proto_type: 0x10,
        proto_ver: 2,
        enc_mode: policy::NONE,
        ..Default::default()
    }));
    session.feed(&wire(&create));

    assert!(session.channel(0x8000_0004).is_none());
    let frame = session.flush().expect("rejection queued");
    let msg = decode(&frame);
    assert_eq!(msg.head.channel, 0x8000_0004);
    match msg.body {
        Body::ChannelClose(close) => assert_eq!(close.reason, error::SERVICE_NO_SUPPORT),
        other => panic!("expected close, got {other:?}"),
    }
}

#[test]
fn claimed_incoming_channel_can_be_accepted() {
    let mut session = started_session();
    session.set_channel_handler(|channel| channel.service() == 0x11);

    let create = Message::new(Body::ChannelCreate(sametime_codec::message::ChannelCreate {
        channel: 0x8000_0009,
        target: Identity { user: "carol".into(), community: None },
        service: 0x11,
        proto_type: 0x10,
        proto_ver: 2,
        enc_mode: policy::NONE,
        ..Default::default()
    }));
    session.feed(&wire(&create));
    let channel = session.channel(0x8000_0009).expect("claimed channel is kept");
    assert!(!channel.is_open());

    session.open_channel(0x8000_0009, &Opaque::new()).expect("accept");
    assert!(session.channel(0x8000_0009).expect("channel").is_open());
    let frame = session.flush().expect("accept queued");
    match decode(&frame).body {
        Body::ChannelAccept(accept) => assert_eq!(accept.enc_mode, policy::NONE),
        other => panic!("expected accept, got {other:?}"),
    }
}

#[test]
fn encrypted_channel_between_two_sessions() {
    // two engines wired back to back negotiate DH-RC2 and exchange data
    let mut creator = started_session();
    let mut receiver = started_session();
    receiver.set_channel_handler(|_| true);

    let id = creator.new_channel(
        Identity { user: "carol".into(), community: None },
        0x11,
        0x10,
        2,
        policy::ANY,
    );
    creator.open_channel(id, &Opaque::new()).expect("open");
    let create_frame = creator.flush().expect("create queued");

    receiver.feed(&create_frame);
    receiver.open_channel(id, &Opaque::new()).expect("accept");
    let accept_frame = receiver.flush().expect("accept queued");

    // the accepted policy is the strongest common cipher
    match decode(&accept_frame).body {
        Body::ChannelAccept(ref accept) => {
            assert_eq!(accept.enc_mode, 0x2000);
            assert_eq!(accept.enc_item.cipher, 0x0001);
        }
        ref other => panic!("expected accept, got {other:?}"),
    }

    creator.feed(&accept_frame);
    drain(&mut creator);
    assert!(creator.channel(id).expect("channel").is_open());
    assert_eq!(creator.channel(id).expect("channel").accepted_policy(), 0x2000);

    creator
        .channel_send(id, 0x0064, b"the eagle has landed", true)
        .expect("send");
    let data_frame = creator.flush().expect("data queued");

    // ciphertext on the wire
    match decode(&data_frame).body {
        Body::ChannelSend(ref send) => {
            assert_ne!(send.data.as_slice(), b"the eagle has landed")
        }
        ref other => panic!("expected send, got {other:?}"),
    }

    receiver.feed(&data_frame);
    let events = drain(&mut receiver);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ChannelData { channel, kind, data }
            if *channel == id && *kind == 0x0064 && data == b"the eagle has landed"
    )));

    // and the reply direction works too
    receiver.channel_send(id, 0x0065, b"roger", true).expect("reply");
    let reply = receiver.flush().expect("reply queued");
    creator.feed(&reply);
    let events = drain(&mut creator);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ChannelData { kind, data, .. } if *kind == 0x0065 && data == b"roger"
    )));
}

#[test]
fn accept_with_unknown_cipher_closes_the_channel() {
    let mut session = started_session();
    let id = session.new_channel(
        Identity { user: "dave".into(), community: None },
        0x11,
        0x10,
        2,
        policy::ANY,
    );
    session.open_channel(id, &Opaque::new()).expect("open");
    session.flush().expect("frame queued");

    let mut accept = Message::new(Body::ChannelAccept(ChannelAccept {
        enc_mode: 0x4000,
        enc_item: EncItem { cipher: 0x7777, info: Opaque::new() },
        ..Default::default()
    }));
    accept.head.channel = id;
    session.feed(&wire(&accept));

    assert!(session.channel(id).is_none());
    let events = drain(&mut session);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ChannelClosed { code, .. } if *code == error::NO_COMMON_ENCRYPT
    )));
}

#[test]
fn undecryptable_channel_data_is_dropped_not_fatal() {
    let mut session = started_session();
    session.set_channel_handler(|_| true);
    let create = Message::new(Body::ChannelCreate(sametime_codec::message::ChannelCreate {
        channel: 0x8000_0001,
        service: 0x11,
        enc_mode: policy::NONE,
        ..Default::default()
    }));
    session.feed(&wire(&create));
    session.open_channel(0x8000_0001, &Opaque::new()).expect("accept");
    session.flush().expect("frame queued");
    drain(&mut session);

    // encrypted flag on a channel that negotiated no cipher
    let mut send = Message::new(Body::ChannelSend(ChannelSend {
        kind: 1,
        data: Opaque::from(vec![0u8; 8]),
    }));
    send.head.channel = 0x8000_0001;
    send.head.options = sametime_codec::message::option::ENCRYPT;
    session.feed(&wire(&send));

    assert!(drain(&mut session)
        .iter()
        .all(|e| !matches!(e, SessionEvent::ChannelData { .. })));
    assert_eq!(session.state(), SessionState::Started);
}

// ─── Queues and shutdown ─────────────────────────────────────────────────────

#[test]
fn session_fifo_drains_before_channel_queue() {
    let mut session = started_session();
    let target = Identity { user: "dave".into(), community: None };
    let id = session.new_channel(target, 1, 1, 1, policy::NONE);
    session.open_channel(id, &Opaque::new()).expect("open");
    session.send_keepalive();

    // keepalive went to the session FIFO after the channel create was
    // queued, yet it still flushes first
    assert_eq!(session.flush(), Some(vec![0x80]));
    let frame = session.flush().expect("channel frame next");
    assert!(matches!(decode(&frame).body, Body::ChannelCreate(_)));
    assert_eq!(session.pending(), 0);
}

#[test]
fn flushed_bytes_match_queued_frames() {
    let mut session = started_session();
    session.send_keepalive();
    session.sense_service(0x15);
    session.set_status(&Status { kind: Status::AWAY, idle_since: 60, desc: "bbl".into() });

    let mut total = 0usize;
    let mut frames = 0usize;
    while let Some(frame) = session.flush() {
        if frame != [0x80] {
            let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
            assert_eq!(len + 4, frame.len());
        }
        total += frame.len();
        frames += 1;
    }
    assert_eq!(frames, 3);
    assert!(total > 3);
}

#[test]
fn stop_discards_queued_output_and_closes_channels() {
    let mut session = started_session();
    let target = Identity { user: "dave".into(), community: None };
    let id = session.new_channel(target, 1, 1, 1, policy::NONE);
    session.open_channel(id, &Opaque::new()).expect("open");
    let mut accept = Message::new(Body::ChannelAccept(ChannelAccept::default()));
    accept.head.channel = id;
    session.feed(&wire(&accept));
    session.send_keepalive();
    drain(&mut session);

    session.stop(0);
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.pending(), 0);
    assert_eq!(session.flush(), None);
    assert!(session.channel(id).is_none());

    let events = drain(&mut session);
    let seen = states(&events);
    assert_eq!(seen, vec![SessionState::Stopping, SessionState::Stopped]);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::ChannelClosed { channel, .. } if *channel == id)));

    // stopping again is a no-op
    session.stop(0);
    assert!(drain(&mut session).is_empty());
}
