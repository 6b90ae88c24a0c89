//! Diffie-Hellman key exchange over the protocol's fixed parameters.
//!
//! The community servers use a single well-known 512-bit prime with
//! base 3. Keys travel on the wire as minimal big-endian byte strings
//! (no leading zero padding).

use num_bigint::BigUint;
use num_traits::Zero;

/// The fixed 512-bit prime modulus.
pub const PRIME: [u8; 64] = [
    0xCF, 0x84, 0xAF, 0xCE, 0x86, 0xDD, 0xFA, 0x52,
    0x7F, 0x13, 0x6D, 0x10, 0x35, 0x75, 0x28, 0xEE,
    0xFB, 0xA0, 0xAF, 0xEF, 0x80, 0x8F, 0x29, 0x17,
    0x4E, 0x3B, 0x6A, 0x9E, 0x97, 0x00, 0x01, 0x71,
    0x7C, 0x8F, 0x10, 0x6C, 0x41, 0xC1, 0x61, 0xA6,
    0xCE, 0x91, 0x05, 0x7B, 0x34, 0xDA, 0x62, 0xCB,
    0xB8, 0x7B, 0xFD, 0xC1, 0xB3, 0x5C, 0x1B, 0x91,
    0x0F, 0xEA, 0x72, 0x24, 0x9D, 0x56, 0x6B, 0x9F,
];

/// The fixed generator.
const BASE: u32 = 3;

/// The prime modulus as a big integer.
pub fn prime() -> BigUint {
    BigUint::from_bytes_be(&PRIME)
}

/// Import a wire-format (big-endian) integer.
pub fn import(data: &[u8]) -> BigUint {
    BigUint::from_bytes_be(data)
}

/// Export an integer to wire format: minimal big-endian bytes.
pub fn export(n: &BigUint) -> Vec<u8> {
    if n.is_zero() {
        // from_bytes_be of an empty slice is zero; keep one byte on the wire
        return vec![0];
    }
    n.to_bytes_be()
}

/// A local DH keypair.
pub struct Keypair {
    private: BigUint,
    public: BigUint,
}

impl Keypair {
    /// Generate a keypair from a 512-bit random private exponent.
    pub fn generate() -> Keypair {
        let mut buf = [0u8; 64];
        getrandom::getrandom(&mut buf).expect("getrandom");
        Self::from_private(BigUint::from_bytes_be(&buf))
    }

    /// Build the keypair for a known private exponent.
    pub fn from_private(private: BigUint) -> Keypair {
        let public = BigUint::from(BASE).modpow(&private, &prime());
        Keypair { private, public }
    }

    /// The public half, `base^private mod prime`.
    pub fn public(&self) -> &BigUint {
        &self.public
    }

    /// Derive the shared secret from the peer's public key.
    pub fn shared_secret(&self, remote_public: &BigUint) -> BigUint {
        remote_public.modpow(&self.private, &prime())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_commutes() {
        let alice = Keypair::from_private(BigUint::from(0x1234_5678_9abc_def1u64));
        let bob = Keypair::from_private(BigUint::from(0xfeed_f00d_cafe_0077u64));
        assert_eq!(
            alice.shared_secret(bob.public()),
            bob.shared_secret(alice.public()),
        );
    }

    #[test]
    fn generated_keys_exchange() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let shared = a.shared_secret(b.public());
        assert_eq!(shared, b.shared_secret(a.public()));
        // a 512-bit modulus keeps the shared secret within 64 bytes
        assert!(export(&shared).len() <= 64);
    }

    #[test]
    fn export_is_minimal() {
        let n = BigUint::from(0x01_02u32);
        assert_eq!(export(&n), vec![0x01, 0x02]);
        assert_eq!(import(&export(&n)), n);
        assert_eq!(export(&BigUint::zero()), vec![0]);
    }

    #[test]
    fn public_key_is_reduced_mod_prime() {
        let kp = Keypair::generate();
        assert!(kp.public() < &prime());
    }
}
