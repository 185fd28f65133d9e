//! Room-token utilities shared across Spinboard services.
//!
//! A room token is an HS256 JWT proving access to a single room. Claims are
//! deliberately minimal:
//!
//! - `key`: the room key the token grants access to
//! - `exp`: expiration timestamp (Unix epoch seconds)
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (resource-exhaustion prevention)
//! - Only HS256 is accepted; the algorithm list is pinned at verification
//! - Error messages are generic so callers cannot distinguish a bad
//!   signature from a bad claim; details go to debug-level logs

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Maximum allowed room-token size in bytes (8KB).
///
/// Typical room tokens are under 300 bytes. Anything near this limit is
/// hostile input and is rejected before any base64 or signature work.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Lifetime of a freshly minted room token.
pub const ROOM_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Clock skew tolerance applied to `exp` at verification time.
pub const EXPIRY_LEEWAY: Duration = Duration::from_secs(30);

/// Errors that can occur while issuing or verifying a room token.
///
/// Verification messages are intentionally generic to prevent information
/// leakage. Detailed causes are logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token size exceeds [`MAX_TOKEN_SIZE_BYTES`].
    #[error("The room token is invalid or expired")]
    TokenTooLarge,

    /// Token signature or structure failed verification.
    #[error("The room token is invalid or expired")]
    Invalid,

    /// Token `exp` claim is in the past.
    #[error("The room token is invalid or expired")]
    Expired,

    /// Token signing failed (malformed secret or serialization failure).
    #[error("failed to sign room token")]
    Signing,
}

/// Claims carried by a room token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomClaims {
    /// Room key this token grants access to.
    pub key: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,
}

/// Mint an HS256 room token for `key`, valid for `ttl` from now.
///
/// # Errors
///
/// Returns [`TokenError::Signing`] if encoding fails.
pub fn issue_room_token(key: &str, secret: &[u8], ttl: Duration) -> Result<String, TokenError> {
    // ttl is bounded in practice (24h), well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let exp = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;

    let claims = RoomClaims {
        key: key.to_string(),
        exp,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "failed to encode room token");
        TokenError::Signing
    })
}

/// Verify an HS256 room token and return its claims.
///
/// The token size is checked before parsing, the signature is verified
/// against `secret`, and `exp` is enforced with [`EXPIRY_LEEWAY`]. The room
/// key claim is returned to the caller, which MUST compare it against the
/// room being joined.
///
/// # Errors
///
/// - [`TokenError::TokenTooLarge`] if the token exceeds the size limit
/// - [`TokenError::Expired`] if the `exp` claim is in the past
/// - [`TokenError::Invalid`] for any other verification failure
pub fn verify_room_token(token: &str, secret: &[u8]) -> Result<RoomClaims, TokenError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "token rejected: size exceeds maximum allowed"
        );
        return Err(TokenError::TokenTooLarge);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = EXPIRY_LEEWAY.as_secs();

    let data = decode::<RoomClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "room token verification failed");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

    Ok(data.claims)
}
