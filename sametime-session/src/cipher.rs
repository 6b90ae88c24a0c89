//! Per-channel cipher framework.
//!
//! A cipher *class* is a long-lived descriptor (identifier, policy,
//! name) that can mint per-channel instances; the session keeps a
//! registry of classes keyed by both identifier and policy. Each
//! channel owns the instances created for its own negotiation and, once
//! accepted, encrypts and decrypts through the chosen one.
//!
//! Negotiation is four half-steps. The creator side calls
//! [`Cipher::offer`] to fill the side-info it sends, and
//! [`Cipher::accepted`] to consume the peer's response. The receiver
//! side calls [`Cipher::offered`] to consume the creator's info and
//! [`Cipher::accept`] to emit its own.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use sametime_codec::Opaque;
use sametime_crypto::rc2::{self, ExpandedKey, INITIAL_IV};
use sametime_crypto::dh;

/// Identifier of the RC2-40 cipher class.
pub const RC2_ID: u16 = 0x0000;
/// Identifier of the DH-RC2-128 cipher class.
pub const DH_RC2_ID: u16 = 0x0001;

/// Policy rank of the RC2-40 cipher class.
pub const RC2_POLICY: u16 = 0x1000;
/// Policy rank of the DH-RC2-128 cipher class.
pub const DH_RC2_POLICY: u16 = 0x2000;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from cipher operations on a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CipherError {
    /// Encrypt or decrypt was called before negotiation finished.
    NotNegotiated,
    /// Ciphertext was not block-aligned.
    Misaligned {
        /// The offending input length.
        len: usize,
    },
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNegotiated => write!(f, "cipher has not been negotiated"),
            Self::Misaligned { len } => {
                write!(f, "ciphertext length {len} is not block-aligned")
            }
        }
    }
}

impl std::error::Error for CipherError {}

impl From<rc2::Error> for CipherError {
    fn from(err: rc2::Error) -> Self {
        match err {
            rc2::Error::Misaligned { len } => Self::Misaligned { len },
        }
    }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Channel-side context a cipher may key from.
pub struct CipherCtx<'a> {
    /// The session's own login id.
    pub local_login_id: &'a str,
    /// The remote peer's login id, as known so far.
    pub remote_login_id: &'a str,
}

/// A per-channel cipher instance.
pub trait Cipher {
    /// Creator side: fill the side-info sent with the channel offer.
    fn offer(&mut self, ctx: &CipherCtx<'_>) -> Opaque;

    /// Receiver side: consume the creator's side-info.
    fn offered(&mut self, ctx: &CipherCtx<'_>, info: &Opaque);

    /// Creator side: consume the receiver's acceptance side-info.
    fn accepted(&mut self, ctx: &CipherCtx<'_>, info: &Opaque);

    /// Receiver side: fill the side-info sent with the acceptance.
    fn accept(&mut self, ctx: &CipherCtx<'_>) -> Opaque;

    /// Encrypt an outgoing payload.
    fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Decrypt an incoming payload.
    fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// A cipher class: static descriptors plus an instance constructor.
pub trait CipherClass {
    /// Wire identifier of the class.
    fn id(&self) -> u16;
    /// Policy rank; higher is stronger.
    fn policy(&self) -> u16;
    /// Short display name.
    fn name(&self) -> &'static str;
    /// Longer description.
    fn description(&self) -> &'static str;
    /// Mint a fresh instance for one channel.
    fn instantiate(&self) -> Box<dyn Cipher>;
}

// ─── RC2-40 ──────────────────────────────────────────────────────────────────

/// The 40-bit RC2 cipher class.
///
/// Keys derive from login ids: the outgoing direction expands the first
/// five bytes of the session's own login id, the incoming direction the
/// first five bytes of the remote login id. No side-info travels on the
/// wire.
pub struct Rc2Class;

impl CipherClass for Rc2Class {
    fn id(&self) -> u16 {
        RC2_ID
    }

    fn policy(&self) -> u16 {
        RC2_POLICY
    }

    fn name(&self) -> &'static str {
        "RC2"
    }

    fn description(&self) -> &'static str {
        "Community RC2/40 cipher"
    }

    fn instantiate(&self) -> Box<dyn Cipher> {
        Box::new(Rc2Cipher {
            outgoing: None,
            incoming: None,
            outgoing_iv: INITIAL_IV,
            incoming_iv: INITIAL_IV,
        })
    }
}

struct Rc2Cipher {
    outgoing: Option<ExpandedKey>,
    incoming: Option<ExpandedKey>,
    outgoing_iv: [u8; 8],
    incoming_iv: [u8; 8],
}

/// The first five bytes of a login id, fewer if the id is shorter.
fn login_key(id: &str) -> &[u8] {
    let bytes = id.as_bytes();
    &bytes[..bytes.len().min(5)]
}

impl Rc2Cipher {
    fn setup(&mut self, ctx: &CipherCtx<'_>) {
        self.outgoing = Some(ExpandedKey::expand(login_key(ctx.local_login_id)));
        self.incoming = Some(ExpandedKey::expand(login_key(ctx.remote_login_id)));
    }
}

impl Cipher for Rc2Cipher {
    fn offer(&mut self, _ctx: &CipherCtx<'_>) -> Opaque {
        Opaque::new()
    }

    fn offered(&mut self, _ctx: &CipherCtx<'_>, _info: &Opaque) {}

    fn accepted(&mut self, ctx: &CipherCtx<'_>, _info: &Opaque) {
        self.setup(ctx);
    }

    fn accept(&mut self, ctx: &CipherCtx<'_>) -> Opaque {
        self.setup(ctx);
        Opaque::new()
    }

    fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = self.outgoing.as_ref().ok_or(CipherError::NotNegotiated)?;
        Ok(rc2::cbc_encrypt(key, &mut self.outgoing_iv, data))
    }

    fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = self.incoming.as_ref().ok_or(CipherError::NotNegotiated)?;
        Ok(rc2::cbc_decrypt(key, &mut self.incoming_iv, data)?)
    }
}

// ─── DH-RC2-128 ──────────────────────────────────────────────────────────────

/// The Diffie-Hellman negotiated RC2-128 cipher class.
///
/// Side-info in both directions is the local DH public key. The RC2 key
/// is expanded from the last 16 bytes of the exported shared secret,
/// giving both directions the same 128-bit key with independent
/// chaining vectors.
pub struct DhRc2Class;

impl CipherClass for DhRc2Class {
    fn id(&self) -> u16 {
        DH_RC2_ID
    }

    fn policy(&self) -> u16 {
        DH_RC2_POLICY
    }

    fn name(&self) -> &'static str {
        "DH RC2"
    }

    fn description(&self) -> &'static str {
        "Community Diffie-Hellman RC2/128 cipher"
    }

    fn instantiate(&self) -> Box<dyn Cipher> {
        Box::new(DhRc2Cipher {
            keys: None,
            shared: None,
            outgoing_iv: INITIAL_IV,
            incoming_iv: INITIAL_IV,
        })
    }
}

struct DhRc2Cipher {
    keys: Option<dh::Keypair>,
    shared: Option<ExpandedKey>,
    outgoing_iv: [u8; 8],
    incoming_iv: [u8; 8],
}

impl DhRc2Cipher {
    fn keys(&mut self) -> &dh::Keypair {
        self.keys.get_or_insert_with(dh::Keypair::generate)
    }

    fn derive_shared(&mut self, remote_public: &Opaque) {
        let remote = dh::import(remote_public.as_slice());
        let secret = self.keys().shared_secret(&remote);
        let bytes = dh::export(&secret);
        let tail = &bytes[bytes.len().saturating_sub(16)..];
        self.shared = Some(ExpandedKey::expand(tail));
    }

    fn export_public(&mut self) -> Opaque {
        Opaque::from(dh::export(self.keys().public()))
    }
}

impl Cipher for DhRc2Cipher {
    fn offer(&mut self, _ctx: &CipherCtx<'_>) -> Opaque {
        self.export_public()
    }

    fn offered(&mut self, _ctx: &CipherCtx<'_>, info: &Opaque) {
        self.derive_shared(info);
    }

    fn accepted(&mut self, _ctx: &CipherCtx<'_>, info: &Opaque) {
        self.derive_shared(info);
    }

    fn accept(&mut self, _ctx: &CipherCtx<'_>) -> Opaque {
        self.export_public()
    }

    fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = self.shared.as_ref().ok_or(CipherError::NotNegotiated)?;
        Ok(rc2::cbc_encrypt(key, &mut self.outgoing_iv, data))
    }

    fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = self.shared.as_ref().ok_or(CipherError::NotNegotiated)?;
        Ok(rc2::cbc_decrypt(key, &mut self.incoming_iv, data)?)
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// The session's cipher class registry, keyed by identifier and by
/// policy. A class whose identifier or policy is already taken is
/// refused.
#[derive(Default)]
pub struct CipherRegistry {
    by_id: BTreeMap<u16, Rc<dyn CipherClass>>,
    by_policy: BTreeMap<u16, Rc<dyn CipherClass>>,
}

impl CipherRegistry {
    /// A registry holding the two built-in classes.
    pub fn builtin() -> Self {
        let mut reg = Self::default();
        reg.add(Rc::new(Rc2Class));
        reg.add(Rc::new(DhRc2Class));
        reg
    }

    /// Register a class; returns false when its id or policy collides.
    pub fn add(&mut self, class: Rc<dyn CipherClass>) -> bool {
        let id = class.id();
        let policy = class.policy();
        if self.by_id.contains_key(&id) || self.by_policy.contains_key(&policy) {
            return false;
        }
        self.by_id.insert(id, class.clone());
        self.by_policy.insert(policy, class);
        true
    }

    /// Drop the class registered under `id`.
    pub fn remove(&mut self, id: u16) {
        if let Some(class) = self.by_id.remove(&id) {
            self.by_policy.remove(&class.policy());
        }
    }

    /// Look up a class by identifier.
    pub fn get(&self, id: u16) -> Option<&Rc<dyn CipherClass>> {
        self.by_id.get(&id)
    }

    /// Look up a class by policy.
    pub fn get_by_policy(&self, policy: u16) -> Option<&Rc<dyn CipherClass>> {
        self.by_policy.get(&policy)
    }

    /// All registered classes in ascending identifier order.
    pub fn classes(&self) -> impl Iterator<Item = &Rc<dyn CipherClass>> {
        self.by_id.values()
    }

    /// True when no class is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> CipherCtx<'a> {
        CipherCtx { local_login_id: "10ab_creator", remote_login_id: "20cd_target" }
    }

    #[test]
    fn rc2_directions_pair_up_across_peers() {
        // creator's outgoing key is its own login id; receiver keys its
        // incoming direction from the same id, so the streams pair up
        let creator_ctx = CipherCtx { local_login_id: "aaaaa", remote_login_id: "bbbbb" };
        let receiver_ctx = CipherCtx { local_login_id: "bbbbb", remote_login_id: "aaaaa" };

        let mut creator = Rc2Class.instantiate();
        let mut receiver = Rc2Class.instantiate();
        creator.offer(&creator_ctx);
        receiver.offered(&receiver_ctx, &Opaque::new());
        let info = receiver.accept(&receiver_ctx);
        creator.accepted(&creator_ctx, &info);

        let secret = b"rendezvous at noon";
        let wire = creator.encrypt(secret).unwrap();
        assert_ne!(wire.as_slice(), secret.as_slice());
        assert_eq!(receiver.decrypt(&wire).unwrap(), secret);

        let reply = receiver.encrypt(b"ack").unwrap();
        assert_eq!(creator.decrypt(&reply).unwrap(), b"ack");
    }

    #[test]
    fn dh_rc2_negotiates_a_shared_key() {
        let c = ctx();
        let mut creator = DhRc2Class.instantiate();
        let mut receiver = DhRc2Class.instantiate();

        let offer = creator.offer(&c);
        assert!(!offer.is_empty(), "offer carries the DH public key");
        receiver.offered(&c, &offer);
        let answer = receiver.accept(&c);
        creator.accepted(&c, &answer);

        let wire = creator.encrypt(b"over the wall").unwrap();
        assert_eq!(receiver.decrypt(&wire).unwrap(), b"over the wall");
        let reply = receiver.encrypt(b"copy that").unwrap();
        assert_eq!(creator.decrypt(&reply).unwrap(), b"copy that");
    }

    #[test]
    fn unnegotiated_cipher_refuses_traffic() {
        let mut cipher = DhRc2Class.instantiate();
        assert_eq!(cipher.encrypt(b"x"), Err(CipherError::NotNegotiated));
        assert_eq!(cipher.decrypt(&[0u8; 8]), Err(CipherError::NotNegotiated));
    }

    #[test]
    fn registry_refuses_colliding_classes() {
        let mut reg = CipherRegistry::builtin();
        assert!(!reg.add(Rc::new(Rc2Class)));
        assert!(reg.get(RC2_ID).is_some());
        assert!(reg.get_by_policy(DH_RC2_POLICY).is_some());

        let ids: Vec<u16> = reg.classes().map(|c| c.id()).collect();
        assert_eq!(ids, vec![RC2_ID, DH_RC2_ID]);

        reg.remove(RC2_ID);
        assert!(reg.get(RC2_ID).is_none());
        assert!(reg.get_by_policy(RC2_POLICY).is_none());
    }
}
