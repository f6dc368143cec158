//! Security-type selection and VNC challenge-response authentication.
//!
//! The client supports the None and VNC-authentication security types.
//! VNC authentication encrypts the server's 16-byte challenge with DES
//! in two ECB blocks, keyed by the password with each key byte
//! bit-reversed (a quirk of the protocol's reference implementation).

use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};
use des::Des;

use crate::error::ClientError;
use crate::wire::{SECURITY_NONE, SECURITY_VNC_AUTH};

/// Pick a security type from the server's offer.
///
/// With a password configured the client prefers VNC authentication;
/// without one it prefers an unauthenticated session.
pub fn select_security(offered: &[u8], has_password: bool) -> Option<u8> {
    let preference: [u8; 2] = if has_password {
        [SECURITY_VNC_AUTH, SECURITY_NONE]
    } else {
        [SECURITY_NONE, SECURITY_VNC_AUTH]
    };
    preference
        .into_iter()
        .find(|candidate| offered.contains(candidate))
}

/// Compute the 16-byte response to a VNC authentication challenge.
pub fn vnc_auth_response(challenge: &[u8; 16], password: &str) -> [u8; 16] {
    let key = make_key(password);
    let mut response = [0u8; 16];
    response[..8].copy_from_slice(&encrypt_block(&key, &challenge[..8]));
    response[8..].copy_from_slice(&encrypt_block(&key, &challenge[8..]));
    response
}

/// Validate a security-result word, mapping failure to `AuthFailed`.
pub fn check_security_result(result: u32, reason: Option<String>) -> Result<(), ClientError> {
    if result == 0 {
        return Ok(());
    }
    Err(ClientError::AuthFailed(
        reason.unwrap_or_else(|| "server rejected credentials".into()),
    ))
}

/// Derive the DES key: first 8 password bytes, NUL-padded, each byte
/// bit-reversed.
fn make_key(password: &str) -> [u8; 8] {
    let mut key = [0u8; 8];
    let bytes = password.as_bytes();
    let len = bytes.len().min(8);
    key[..len].copy_from_slice(&bytes[..len]);
    for b in &mut key {
        *b = b.reverse_bits();
    }
    key
}

/// DES-ECB encrypt a single 8-byte block.
fn encrypt_block(key: &[u8; 8], block: &[u8]) -> [u8; 8] {
    let cipher = Des::new(&GenericArray::from(*key));
    let mut out = GenericArray::clone_from_slice(&block[..8]);
    cipher.encrypt_block(&mut out);
    out.into()
}

// ── Tests ────────────────────────────────────────────────────────
