//! Common records shared by the message catalog and the session layer.
//!
//! Every record follows the same convention: `put` marshals onto a
//! [`PutBuffer`], `get` unmarshals from a [`GetBuffer`]. A `get` always
//! initializes every field to its default before reading, so a mid-read
//! failure (sticky error flag) still leaves a safely usable value.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::deserialize::GetBuffer;
use crate::serialize::PutBuffer;

// ─── Opaque ──────────────────────────────────────────────────────────────────

/// A length-prefixed byte blob.
///
/// On the wire: `u32` length followed by that many bytes. Zero-length is
/// valid and is how an absent opaque is encoded.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Opaque(Vec<u8>);

impl Opaque {
    /// An empty opaque.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the payload.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Drop the payload, leaving an empty opaque.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Consume the opaque, returning the payload.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Opaque {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<&[u8]> for Opaque {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({} bytes)", self.0.len())
    }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// A community user identity.
///
/// The community may be absent; a remote user in the same community is
/// normally sent with an empty community string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    /// User id string.
    pub user: String,
    /// Community name, when one was given.
    pub community: Option<String>,
}

impl Identity {
    /// Marshal: user string, then community string (empty when absent).
    pub fn put(&self, b: &mut PutBuffer) {
        b.put_str(&self.user);
        b.put_str(self.community.as_deref().unwrap_or(""));
    }

    /// Unmarshal; an empty community string reads back as absent.
    pub fn get(b: &mut GetBuffer) -> Identity {
        let user = b.get_str();
        let community = b.get_str();
        Identity {
            user,
            community: (!community.is_empty()).then_some(community),
        }
    }
}

/// Hash folds the user only; community collisions are resolved by the
/// full equality check.
impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user.hash(state);
    }
}

// ─── Login ───────────────────────────────────────────────────────────────────

/// Optional tail of a [`Login`], gated by a boolean on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginExtra {
    /// Implementation-defined description.
    pub desc: String,
    /// IP address of the login.
    pub ip_addr: u32,
    /// Identifier of the login's server.
    pub server_id: String,
}

/// An extended identity describing one login to the community.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Login {
    /// Who logged in.
    pub id: Identity,
    /// The user's display name.
    pub name: String,
    /// Community-unique id of this login.
    pub login_id: String,
    /// Client type code, see [`crate::codes::client`].
    pub client: u16,
    /// Optional tail, present when the wire flag is set.
    pub extra: Option<LoginExtra>,
}

impl Login {
    /// Marshal in wire order: login id, client, user, name, community,
    /// tail flag, then the optional tail.
    pub fn put(&self, b: &mut PutBuffer) {
        b.put_str(&self.login_id);
        b.put_u16(self.client);
        b.put_str(&self.id.user);
        b.put_str(&self.name);
        b.put_str(self.id.community.as_deref().unwrap_or(""));
        b.put_bool(self.extra.is_some());
        if let Some(extra) = &self.extra {
            b.put_str(&extra.desc);
            b.put_u32(extra.ip_addr);
            b.put_str(&extra.server_id);
        }
    }

    /// Unmarshal a login record.
    pub fn get(b: &mut GetBuffer) -> Login {
        let mut login = Login::default();
        login.login_id = b.get_str();
        login.client = b.get_u16();
        login.id.user = b.get_str();
        login.name = b.get_str();
        let community = b.get_str();
        login.id.community = (!community.is_empty()).then_some(community);
        if b.get_bool() {
            login.extra = Some(LoginExtra {
                desc: b.get_str(),
                ip_addr: b.get_u32(),
                server_id: b.get_str(),
            });
        }
        login
    }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// A user status report.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    /// Status kind, one of the associated constants.
    pub kind: u16,
    /// Seconds since the last status change.
    pub idle_since: u32,
    /// Free-form status description.
    pub desc: String,
}

impl Status {
    /// User is active.
    pub const ACTIVE: u16 = 0x0020;
    /// User is idle.
    pub const IDLE: u16 = 0x0040;
    /// User is away.
    pub const AWAY: u16 = 0x0060;
    /// User is busy / in do-not-disturb.
    pub const BUSY: u16 = 0x0080;

    /// Marshal a status record.
    pub fn put(&self, b: &mut PutBuffer) {
        b.put_u16(self.kind);
        b.put_u32(self.idle_since);
        b.put_str(&self.desc);
    }

    /// Unmarshal a status record.
    pub fn get(b: &mut GetBuffer) -> Status {
        Status {
            kind: b.get_u16(),
            idle_since: b.get_u32(),
            desc: b.get_str(),
        }
    }
}

// ─── Privacy ─────────────────────────────────────────────────────────────────

/// A privacy list: either a deny-list or an allow-list of identities.
///
/// An absent privacy record means allow-all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Privacy {
    /// True to deny the listed users, false to allow only them.
    pub deny: bool,
    /// The listed users.
    pub users: Vec<Identity>,
}

impl Privacy {
    /// Marshal a privacy record. The wire carries the users in reverse
    /// order, each preceded by a false flag byte.
    pub fn put(&self, b: &mut PutBuffer) {
        b.put_bool(self.deny);
        b.put_u32(self.users.len() as u32);
        for user in self.users.iter().rev() {
            b.put_bool(false);
            user.put(b);
        }
    }

    /// Unmarshal a privacy record. A true flag before an identity means
    /// an extra trailing string follows, which is skipped.
    pub fn get(b: &mut GetBuffer) -> Privacy {
        let mut privacy = Privacy::default();
        privacy.deny = b.get_bool();
        let count = b.get_u32();
        for _ in 0..count {
            if b.error() {
                break;
            }
            let flagged = b.get_bool();
            privacy.users.push(Identity::get(b));
            if flagged {
                b.skip_str();
            }
        }
        privacy.users.reverse();
        privacy
    }
}
