//! Single-use activation tokens.

use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::AuthError;

/// Number of random bytes behind a token.
pub const TOKEN_BYTES: usize = 256;

/// Generate a fresh activation token: `TOKEN_BYTES` bytes from the OS RNG,
/// hex-encoded.
pub fn generate_token() -> Result<String, AuthError> {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| AuthError::Token(e.to_string()))?;
    Ok(hex::encode(buf))
}
