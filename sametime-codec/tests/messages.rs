use sametime_codec::common::{Identity, Login, LoginExtra, Opaque, Privacy, Status};
use sametime_codec::message::{
    self, Announce, Body, ChannelAccept, ChannelClose, ChannelCreate, ChannelSend, EncItem,
    Handshake, HandshakeAck, LoginAck, LoginRedirect, Message, OneTime, PrivacyMsg, SenseService,
    StatusMsg,
};

fn roundtrip(msg: Message) {
    let bytes = msg.encode();
    let parsed = Message::decode(&bytes).expect("decode");
    assert_eq!(parsed, msg);
}

fn sample_login() -> Login {
    Login {
        id: Identity { user: "carol".into(), community: Some("corp".into()) },
        name: "Carol".into(),
        login_id: "carol-9931".into(),
        client: 0x1700,
        extra: Some(LoginExtra {
            desc: "rust client".into(),
            ip_addr: 0x0a01_0203,
            server_id: "srv-east".into(),
        }),
    }
}

#[test]
fn handshake_roundtrip_with_version_tail() {
    let mut msg = Message::new(Body::Handshake(Handshake {
        major: 0x001e,
        minor: 0x001d,
        srvrcalc_addr: 0,
        client_type: 0x1700,
        loclcalc_addr: 0x7f00_0001,
        unknown_a: 0x0100,
        unknown_b: 0,
        local_host: "workstation".into(),
    }));
    msg.head.channel = 0;
    roundtrip(msg);
}

#[test]
fn handshake_old_version_omits_tail() {
    let msg = Message::new(Body::Handshake(Handshake {
        major: 0x001d,
        minor: 0x0017,
        client_type: 0x1000,
        ..Handshake::default()
    }));
    let bytes = msg.encode();
    // head (8) + major/minor (4) + channel echo (4) + srvrcalc (4)
    // + client type (2) + loclcalc (4), and nothing more
    assert_eq!(bytes.len(), 8 + 4 + 4 + 4 + 2 + 4);
    roundtrip(msg);
}

#[test]
fn handshake_ack_roundtrip() {
    roundtrip(Message::new(Body::HandshakeAck(HandshakeAck {
        major: 0x001e,
        minor: 0x001d,
        srvrcalc_addr: 0xc0a8_0001,
        magic: 0x8f32_91aa,
        data: Opaque::from(vec![9u8; 64]),
    })));
}

#[test]
fn login_trailing_word_is_written_but_not_read() {
    let msg = Message::new(Body::Login(message::Login {
        client_type: 0x1700,
        name: "carol".into(),
        auth_type: 0x0004,
        auth_data: Opaque::from(vec![1, 2, 3]),
    }));
    let bytes = msg.encode();
    // the body ends with auth_type followed by a u16 zero
    assert_eq!(&bytes[bytes.len() - 4..], &[0x00, 0x04, 0x00, 0x00]);
    roundtrip(msg);
}

#[test]
fn login_ack_roundtrip() {
    roundtrip(Message::new(Body::LoginAck(LoginAck {
        login: sample_login(),
        privacy: Privacy {
            deny: false,
            users: vec![Identity { user: "mallory".into(), community: None }],
        },
        status: Status { kind: Status::ACTIVE, idle_since: 0, desc: "here".into() },
    })));
}

#[test]
fn login_redirect_and_force_roundtrip() {
    roundtrip(Message::new(Body::LoginRedirect(LoginRedirect {
        host: "community2.example.com".into(),
        server_id: "srv-west".into(),
    })));
    roundtrip(Message::new(Body::LoginForce));
}

#[test]
fn channel_create_roundtrip_with_offer() {
    let mut msg = Message::new(Body::ChannelCreate(ChannelCreate {
        reserved: 0,
        channel: 7,
        target: Identity { user: "dave".into(), community: None },
        service: 0x8000_0011,
        proto_type: 0x0000_0010,
        proto_ver: 0x0000_0002,
        options: 0,
        addtl: Opaque::from(vec![0xaa, 0xbb]),
        creator: None,
        enc_mode: 0x0002,
        enc_items: vec![
            EncItem { cipher: 0x0000, info: Opaque::new() },
            EncItem { cipher: 0x0001, info: Opaque::from(vec![5u8; 64]) },
        ],
        enc_extra: 0x0002,
        enc_flag: true,
    }));
    msg.head.channel = 7;
    roundtrip(msg);
}

#[test]
fn channel_create_trailer_is_tolerated_without_offer() {
    let msg = Message::new(Body::ChannelCreate(ChannelCreate {
        channel: 3,
        target: Identity { user: "erin".into(), community: None },
        service: 1,
        proto_type: 2,
        proto_ver: 3,
        enc_mode: 0,
        ..ChannelCreate::default()
    }));
    let bytes = msg.encode();
    // the trailing 0x0007 is present on the wire
    assert_eq!(&bytes[bytes.len() - 2..], &[0x00, 0x07]);
    roundtrip(msg);
}

#[test]
fn channel_accept_roundtrip() {
    roundtrip(Message::new(Body::ChannelAccept(ChannelAccept {
        service: 0x8000_0011,
        proto_type: 0x10,
        proto_ver: 2,
        addtl: Opaque::new(),
        acceptor: Some(sample_login()),
        enc_mode: 0x2000,
        enc_item: EncItem { cipher: 0x0001, info: Opaque::from(vec![3u8; 64]) },
        enc_extra: 0x0002,
        enc_flag: false,
    })));
}

#[test]
fn channel_send_and_close_roundtrip() {
    let mut send = Message::new(Body::ChannelSend(ChannelSend {
        kind: 0x0064,
        data: Opaque::from(b"payload".as_slice()),
    }));
    send.head.channel = 12;
    send.head.options = message::option::ENCRYPT;
    roundtrip(send);

    roundtrip(Message::new(Body::ChannelClose(ChannelClose {
        reason: 0x8000_0001,
        data: Opaque::from(vec![1]),
    })));
}

#[test]
fn one_time_roundtrip() {
    roundtrip(Message::new(Body::OneTime(OneTime {
        id: 99,
        target: Identity { user: "peer".into(), community: Some("corp".into()) },
        service: 0x1000,
        proto_type: 1,
        proto_ver: 1,
        kind: 0x0001,
        data: Opaque::from(vec![0xde, 0xad]),
    })));
}

#[test]
fn status_privacy_sense_admin_roundtrip() {
    roundtrip(Message::new(Body::Status(StatusMsg {
        status: Status { kind: Status::AWAY, idle_since: 1200, desc: "lunch".into() },
    })));
    roundtrip(Message::new(Body::Privacy(PrivacyMsg {
        privacy: Privacy { deny: true, users: vec![] },
    })));
    roundtrip(Message::new(Body::SenseService(SenseService { service: 0x8000_0015 })));
    roundtrip(Message::new(Body::Admin(message::Admin {
        text: "maintenance at midnight".into(),
    })));
}

#[test]
fn announce_roundtrip() {
    roundtrip(Message::new(Body::Announce(Announce {
        sender: Some(sample_login()),
        unknown_a: 0,
        may_reply: true,
        text: "build is green".into(),
        recipients: vec!["@U carol".into(), "@G release".into()],
    })));
}

#[test]
fn attribs_are_gated_by_the_options_bit() {
    let mut msg = Message::new(Body::SenseService(SenseService { service: 5 }));
    msg.head.attribs = Some(Opaque::from(vec![7, 7, 7]));
    let bytes = msg.encode();
    let parsed = Message::decode(&bytes).expect("decode");
    assert_eq!(parsed.head.attribs, msg.head.attribs);
    assert_ne!(parsed.head.options & message::option::ATTRIBS, 0);
}

#[test]
fn unknown_kind_is_reported_not_guessed() {
    // type 0x00f0 does not exist; head is well-formed
    let bytes = [0x00, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05];
    match Message::decode(&bytes) {
        Err(message::Error::UnknownKind { kind }) => assert_eq!(kind, 0x00f0),
        other => panic!("expected UnknownKind, got {other:?}"),
    }
}

#[test]
fn truncated_message_is_an_error() {
    let msg = Message::new(Body::LoginRedirect(LoginRedirect {
        host: "community2.example.com".into(),
        server_id: "srv".into(),
    }));
    let bytes = msg.encode();
    match Message::decode(&bytes[..bytes.len() - 3]) {
        Err(message::Error::Truncated { kind }) => {
            assert_eq!(kind, message::kind::LOGIN_REDIRECT)
        }
        other => panic!("expected Truncated, got {other:?}"),
    }
}
