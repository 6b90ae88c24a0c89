//! Cryptographic primitives for the Sametime community protocol.
//!
//! Provides:
//! - The RC2 variant spoken by community servers: a 16-round block
//!   cipher with a key expansion that intentionally differs from
//!   RFC 2268, plus the protocol's CBC chaining and padding
//! - Diffie-Hellman key exchange over the protocol's fixed 512-bit
//!   prime with base 3
//!
//! The RC2 routines must not be swapped for a standard library
//! implementation: interoperability depends on reproducing the
//! deployed key schedule bit-for-bit.

#![deny(unsafe_code)]

pub mod dh;
pub mod rc2;

pub use rc2::ExpandedKey;
