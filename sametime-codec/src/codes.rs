//! Numeric code catalogs: authentication types, encryption policies,
//! client identifiers and protocol error codes.

/// Authentication schemes carried in the login message.
pub mod auth {
    /// Password sent as a plain string.
    pub const PLAIN: u16 = 0x0000;
    /// Pre-issued login token.
    pub const TOKEN: u16 = 0x0001;
    /// Password encrypted with a random 40-bit RC2 key.
    pub const RC2: u16 = 0x0002;
    /// Password encrypted under a Diffie-Hellman negotiated RC2-128 key.
    pub const DH_RC2: u16 = 0x0004;
}

/// Channel encryption policies. Higher cipher-specific policy values
/// rank stronger; zero means no encryption.
pub mod policy {
    /// No encryption on the channel.
    pub const NONE: u16 = 0x0000;
    /// Encryption available but optional per message.
    pub const WHATEVER: u16 = 0x0001;
    /// Always encrypt, any common cipher.
    pub const ANY: u16 = 0x0002;
}

/// Known client type identifiers announced at handshake and login.
pub mod client {
    /// Official binary library.
    pub const LIB: u16 = 0x1000;
    /// Official Java web applet.
    pub const JAVA_WEB: u16 = 0x1001;
    /// Official binary application.
    pub const BINARY: u16 = 0x1002;
    /// Official Java application.
    pub const JAVA_APP: u16 = 0x1003;
    /// Links toolkit.
    pub const LINKS: u16 = 0x100a;
    /// Notes 6.5 embedded client.
    pub const NOTES_6_5: u16 = 0x1200;
    /// Notes 7.0 embedded client.
    pub const NOTES_7_0: u16 = 0x1214;
    /// Instant collaboration toolkit.
    pub const ICT: u16 = 0x1300;
    /// Trillian community plugin.
    pub const TRILLIAN: u16 = 0x16aa;
    /// This library's own identifier.
    pub const LIBRARY: u16 = 0x1700;
}

/// Protocol error codes, surfaced in channel-close reasons and session
/// stop information. The high bit distinguishes failures from
/// informational codes.
pub mod error {
    /// Success.
    pub const SUCCESS: u32 = 0x0000_0000;
    /// Request delayed.
    pub const REQUEST_DELAY: u32 = 0x0000_0011;

    /// Connection broken; used when the transport reports EOF or error.
    pub const CONNECTION_BROKEN: u32 = 0x8000_0000;
    /// General failure.
    pub const FAILURE: u32 = 0x8000_0001;
    /// Request is invalid.
    pub const REQUEST_INVALID: u32 = 0x8000_0002;
    /// Not logged in.
    pub const NOT_LOGGED_IN: u32 = 0x8000_0003;
    /// User is not online.
    pub const NO_USER: u32 = 0x8000_0006;
    /// Requested channel is not supported.
    pub const CHANNEL_NO_SUPPORT: u32 = 0x8000_0007;
    /// Requested channel already exists.
    pub const CHANNEL_EXISTS: u32 = 0x8000_0008;
    /// Requested service is not supported.
    pub const SERVICE_NO_SUPPORT: u32 = 0x8000_0009;
    /// Requested protocol is not supported.
    pub const PROTOCOL_NO_SUPPORT: u32 = 0x8000_000a;
    /// Version is not supported.
    pub const VERSION_NO_SUPPORT: u32 = 0x8000_000b;
    /// User is invalid or not trusted.
    pub const USER_SKETCHY: u32 = 0x8000_000c;
    /// Already initialized.
    pub const ALREADY_INITIALIZED: u32 = 0x8000_0013;
    /// No common encryption method between the peers.
    pub const NO_COMMON_ENCRYPT: u32 = 0x8000_0014;

    /// Protocol version mismatch at handshake.
    pub const VERSION_MISMATCH: u32 = 0x8000_0200;
    /// Message exceeded the server's size limit.
    pub const FAT_MESSAGE: u32 = 0x8000_0201;
    /// Connection aborted.
    pub const CONNECTION_ABORTED: u32 = 0x8000_0203;
    /// Connection refused.
    pub const CONNECTION_REFUSED: u32 = 0x8000_0204;
    /// Connection reset.
    pub const CONNECTION_RESET: u32 = 0x8000_0205;
    /// Connection timed out.
    pub const CONNECTION_TIMED: u32 = 0x8000_0206;
    /// Connection closed.
    pub const CONNECTION_CLOSED: u32 = 0x8000_0207;
    /// Incorrect username or password.
    pub const INCORRECT_LOGIN: u32 = 0x8000_0208;
    /// Login verification down or unavailable.
    pub const VERIFICATION_DOWN: u32 = 0x8000_020a;
    /// The guest name is currently in use.
    pub const GUEST_IN_USE: u32 = 0x8000_0218;
    /// Logged in to two different servers concurrently.
    pub const MULTI_SERVER_LOGIN: u32 = 0x8000_0220;

    /// A human-readable description of `code`. Unknown codes render as
    /// their hexadecimal value.
    pub fn describe(code: u32) -> String {
        let text = match code {
            SUCCESS => "Success",
            REQUEST_DELAY => "Request delayed",
            CONNECTION_BROKEN => "Connection broken",
            FAILURE => "General failure",
            REQUEST_INVALID => "Request is invalid",
            NOT_LOGGED_IN => "Not logged in",
            NO_USER => "User is not online",
            CHANNEL_NO_SUPPORT => "Requested channel is not supported",
            CHANNEL_EXISTS => "Requested channel already exists",
            SERVICE_NO_SUPPORT => "Requested service is not supported",
            PROTOCOL_NO_SUPPORT => "Requested protocol is not supported",
            VERSION_NO_SUPPORT => "Version is not supported",
            USER_SKETCHY => "User is invalid or not trusted",
            ALREADY_INITIALIZED => "Already initialized",
            NO_COMMON_ENCRYPT => "No common encryption method",
            VERSION_MISMATCH => "Version mismatch",
            FAT_MESSAGE => "Message is too large",
            CONNECTION_ABORTED => "Connection aborted",
            CONNECTION_REFUSED => "Connection refused",
            CONNECTION_RESET => "Connection reset",
            CONNECTION_TIMED => "Connection timed out",
            CONNECTION_CLOSED => "Connection closed",
            INCORRECT_LOGIN => "Incorrect username/password",
            VERIFICATION_DOWN => "Login verification down or unavailable",
            GUEST_IN_USE => "The guest name is currently being used",
            MULTI_SERVER_LOGIN => "Login to two different servers concurrently",
            other => return format!("{other:#010x}"),
        };
        text.to_owned()
    }
}
