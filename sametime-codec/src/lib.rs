//! Wire marshalling for the Sametime community protocol.
//!
//! This crate handles:
//! * Primitive put/get of the protocol's integer, string and blob forms
//! * The common records (identity, login, status, privacy)
//! * The tagged message catalog with per-variant serialization
//!
//! All multi-byte integers on the wire are big-endian. Strings are
//! `u16`-length-prefixed UTF-8 with no terminator; opaques are
//! `u32`-length-prefixed byte blobs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codes;
pub mod common;
pub mod deserialize;
pub mod message;
pub mod serialize;

pub use common::{Identity, Login, LoginExtra, Opaque, Privacy, Status};
pub use deserialize::GetBuffer;
pub use message::Message;
pub use serialize::PutBuffer;
