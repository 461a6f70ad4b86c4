//! Challenge-response computation for the two supported auth plugins.
//!
//! Both scrambles are pure functions of `(password, challenge)`; the
//! TLS-dependent branch only exists in the caching-SHA2 full-auth stage.

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";

/// Scramble length both plugins expect.
pub const CHALLENGE_LEN: usize = 20;

/// Compute the auth response for the initial login request or an auth-switch.
///
/// An empty password always yields an empty response, before any plugin is
/// consulted. Unrecognized plugin names fail with `UnknownAuthPlugin`.
pub fn compute_auth_response(
    plugin_name: &str,
    password: &str,
    challenge: &[u8],
) -> Result<Vec<u8>> {
    if password.is_empty() {
        return Ok(Vec::new());
    }

    match plugin_name {
        MYSQL_NATIVE_PASSWORD => Ok(scramble_sha1(password, challenge).to_vec()),
        CACHING_SHA2_PASSWORD => Ok(scramble_sha256(password, challenge).to_vec()),
        other => Err(Error::UnknownAuthPlugin(other.to_string())),
    }
}

// SHA1( password ) ^ SHA1( challenge + SHA1( SHA1( password ) ) )
fn scramble_sha1(password: &str, challenge: &[u8]) -> [u8; 20] {
    let mut ctx = Sha1::new();

    ctx.update(password);
    let mut pw_hash = ctx.finalize_reset();

    ctx.update(pw_hash);
    let pw_hash_hash = ctx.finalize_reset();

    ctx.update(first_challenge_bytes(challenge));
    ctx.update(pw_hash_hash);
    let salted = ctx.finalize();

    xor_eq(&mut pw_hash, &salted);
    pw_hash.into()
}

// SHA256( password ) ^ SHA256( SHA256( SHA256( password ) ) + challenge )
fn scramble_sha256(password: &str, challenge: &[u8]) -> [u8; 32] {
    let mut ctx = Sha256::new();

    ctx.update(password);
    let mut pw_hash = ctx.finalize_reset();

    ctx.update(pw_hash);
    let pw_hash_hash = ctx.finalize_reset();

    ctx.update(pw_hash_hash);
    ctx.update(first_challenge_bytes(challenge));
    let salted = ctx.finalize();

    xor_eq(&mut pw_hash, &salted);
    pw_hash.into()
}

// The greeting may carry a trailing NUL after the 20 scramble bytes.
fn first_challenge_bytes(challenge: &[u8]) -> &[u8] {
    &challenge[..challenge.len().min(CHALLENGE_LEN)]
}

fn xor_eq(x: &mut [u8], y: &[u8]) {
    debug_assert_eq!(x.len(), y.len());
    for (a, b) in x.iter_mut().zip(y) {
        *a ^= b;
    }
}

/// Second stage of caching-SHA2: the server answers the scramble with an
/// auth-more-data packet (tag 0x01) carrying a one-byte signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastAuthSignal {
    /// 0x03: the scramble matched the cache; an OK packet follows.
    Success,
    /// 0x04: the server needs the cleartext password over a secure channel.
    FullAuthRequired,
}

pub fn parse_fast_auth_signal(payload: &[u8]) -> Result<FastAuthSignal> {
    match payload {
        [0x01, 0x03] => Ok(FastAuthSignal::Success),
        [0x01, 0x04] => Ok(FastAuthSignal::FullAuthRequired),
        _ => Err(Error::ProtocolValue(format!(
            "unexpected caching-sha2 auth signal: {:02x?}",
            payload
        ))),
    }
}

/// Full-auth response: the password in cleartext, null-terminated. Only
/// legal over TLS; the caller enforces that.
pub fn cleartext_password(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() + 1);
    out.extend_from_slice(password.as_bytes());
    out.push(0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_password_matches_manual_computation() {
        // SHA1("hola") XOR SHA1("0123456789ABCDEFGHIJ" + SHA1(SHA1("hola")))
        let challenge = b"0123456789ABCDEFGHIJ";
        let response = compute_auth_response(MYSQL_NATIVE_PASSWORD, "hola", challenge).unwrap();
        assert_eq!(response.len(), 20);

        let pw_hash: [u8; 20] = Sha1::digest("hola").into();
        let pw_hash_hash: [u8; 20] = Sha1::digest(pw_hash).into();
        let mut ctx = Sha1::new();
        ctx.update(challenge);
        ctx.update(pw_hash_hash);
        let salted: [u8; 20] = ctx.finalize().into();

        let expected: Vec<u8> = pw_hash.iter().zip(salted).map(|(a, b)| a ^ b).collect();
        assert_eq!(response, expected);
    }

    #[test]
    fn test_caching_sha2_known_vector() {
        let challenge = [
            0x3e, 0x3b, 0x04, 0x55, 0x04, 0x70, 0x16, 0x3a, 0x4c, 0x15, 0x35, 0x03, 0x15, 0x76,
            0x73, 0x22, 0x46, 0x08, 0x18, 0x01,
        ];
        let expected = [
            0xa1, 0xc1, 0xe1, 0xe9, 0x1b, 0xb6, 0x54, 0x4b, 0xa7, 0x37, 0x4b, 0x9c, 0x56, 0x6d,
            0x69, 0x3e, 0x06, 0xca, 0x07, 0x02, 0x98, 0xac, 0xd1, 0x06, 0x18, 0xc6, 0x90, 0x38,
            0x9d, 0x88, 0xe1, 0x20,
        ];
        let response = compute_auth_response(CACHING_SHA2_PASSWORD, "hola", &challenge).unwrap();
        assert_eq!(response, expected);
    }

    #[test]
    fn test_determinism() {
        let challenge = [0x55u8; 20];
        for plugin in [MYSQL_NATIVE_PASSWORD, CACHING_SHA2_PASSWORD] {
            let a = compute_auth_response(plugin, "secret", &challenge).unwrap();
            let b = compute_auth_response(plugin, "secret", &challenge).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_empty_password_short_circuits() {
        // even an unknown plugin succeeds with an empty password
        let response = compute_auth_response("sha256_password", "", &[0u8; 20]).unwrap();
        assert!(response.is_empty());
    }

    #[test]
    fn test_unknown_plugin() {
        let err = compute_auth_response("dialog", "pw", &[0u8; 20]).unwrap_err();
        assert!(matches!(err, Error::UnknownAuthPlugin(name) if name == "dialog"));
    }

    #[test]
    fn test_challenge_trailing_nul_is_ignored() {
        let mut challenge = [0x11u8; 21];
        challenge[20] = 0;
        let with_nul = compute_auth_response(MYSQL_NATIVE_PASSWORD, "pw", &challenge).unwrap();
        let without = compute_auth_response(MYSQL_NATIVE_PASSWORD, "pw", &challenge[..20]).unwrap();
        assert_eq!(with_nul, without);
    }

    #[test]
    fn test_fast_auth_signal() {
        assert_eq!(
            parse_fast_auth_signal(&[0x01, 0x03]).unwrap(),
            FastAuthSignal::Success
        );
        assert_eq!(
            parse_fast_auth_signal(&[0x01, 0x04]).unwrap(),
            FastAuthSignal::FullAuthRequired
        );
        assert!(parse_fast_auth_signal(&[0x01, 0x05]).is_err());
        assert!(parse_fast_auth_signal(&[0x02]).is_err());
    }

    #[test]
    fn test_cleartext_password_is_null_terminated() {
        assert_eq!(cleartext_password("abc"), b"abc\0");
        assert_eq!(cleartext_password(""), b"\0");
    }
}
