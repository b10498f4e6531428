//! Secure Boot V2 public key digest, the value burned into the efuse key block.
//!
//! The digest is the SHA-256 over the public key part of an RSA-3072 signature block:
//!
//! ```text
//! modulus n   384 bytes, little endian
//! exponent e    4 bytes, little endian
//! rinv        384 bytes, little endian, 2^(2 * 3072) mod n
//! m'            4 bytes, little endian, -n^-1 mod 2^32
//! ```

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::ReleaseError;

/// Secure Boot V2 only takes RSA-3072 keys.
pub const KEY_BITS: usize = 3072;
const KEY_BYTES: usize = KEY_BITS / 8;

/// Length of the public key part of the signature block.
pub const KEY_BLOCK_LEN: usize = KEY_BYTES + 4 + KEY_BYTES + 4;

/// Load the public key from a PEM; private keys (PKCS#1 or PKCS#8) and public keys (PKCS#1 or SPKI) are accepted.
pub fn load_public_key(pem: &str) -> Result<RsaPublicKey, ReleaseError> {
    if let Ok(key) = <RsaPrivateKey as DecodeRsaPrivateKey>::from_pkcs1_pem(pem) {
        return Ok(key.to_public_key());
    }
    if let Ok(key) = <RsaPrivateKey as DecodePrivateKey>::from_pkcs8_pem(pem) {
        return Ok(key.to_public_key());
    }
    if let Ok(key) = <RsaPublicKey as DecodePublicKey>::from_public_key_pem(pem) {
        return Ok(key);
    }
    <RsaPublicKey as DecodeRsaPublicKey>::from_pkcs1_pem(pem)
        .map_err(|e| ReleaseError::InvalidSigningKey(e.to_string()))
}

/// Little endian bytes of `v`, zero padded to `len`.
fn to_le_padded(v: &BigUint, len: usize) -> Result<Vec<u8>, ReleaseError> {
    let mut bytes = v.to_bytes_le();
    if bytes.len() > len {
        return Err(ReleaseError::InvalidSigningKey(format!(
            "value needs {} bytes, only {len} available",
            bytes.len()
        )));
    }
    bytes.resize(len, 0);
    Ok(bytes)
}

/// -n^-1 mod 2^32, from the lowest word of the odd modulus.
fn montgomery_factor(n_low: u32) -> u32 {
    // Newton iteration, every step doubles the number of correct low bits; 3 are right to start with.
    let mut inv = n_low;
    for _ in 0..5 {
        inv = inv.wrapping_mul(2u32.wrapping_sub(n_low.wrapping_mul(inv)));
    }
    inv.wrapping_neg()
}

/// The public key part of the signature block, the digest input.
pub fn key_block(key: &RsaPublicKey) -> Result<Vec<u8>, ReleaseError> {
    let bits = key.n().bits();
    if bits != KEY_BITS {
        return Err(ReleaseError::UnsupportedKeySize(bits));
    }
    let n = key.n();
    let n_bytes = to_le_padded(n, KEY_BYTES)?;
    let e_bytes = to_le_padded(key.e(), 4)?;

    let r = BigUint::from_bytes_be(&[1]) << (2 * KEY_BITS);
    let rinv = &r % n;
    let rinv_bytes = to_le_padded(&rinv, KEY_BYTES)?;

    let n_low = u32::from_le_bytes([n_bytes[0], n_bytes[1], n_bytes[2], n_bytes[3]]);
    let m = montgomery_factor(n_low);

    let mut block = Vec::with_capacity(KEY_BLOCK_LEN);
    block.extend_from_slice(&n_bytes);
    block.extend_from_slice(&e_bytes);
    block.extend_from_slice(&rinv_bytes);
    block.extend_from_slice(&m.to_le_bytes());
    Ok(block)
}

/// SHA-256 digest of the public key of the signing key in `pem`.
pub fn public_key_digest(pem: &str) -> Result<[u8; 32], ReleaseError> {
    let key = load_public_key(pem)?;
    let block = key_block(&key)?;
    Ok(Sha256::digest(&block).into())
}
