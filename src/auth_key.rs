//! Auth key generation.
//!
//! Blocking an account replaces its auth key so that remember-me cookies and
//! other sessions derived from the old key stop validating.

use rand::Rng;

/// Character set for auth keys (URL and cookie safe).
const AUTH_KEY_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Length of a generated auth key.
pub const AUTH_KEY_LENGTH: usize = 32;

/// Generate a fresh random auth key.
pub fn generate_auth_key() -> String {
    let mut rng = rand::rng();
    (0..AUTH_KEY_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..AUTH_KEY_CHARSET.len());
            AUTH_KEY_CHARSET[idx] as char
        })
        .collect()
}
