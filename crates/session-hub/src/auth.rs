//! Auth gate: decides whether a join may enter a room.
//!
//! Open rooms admit anyone. Protected rooms require a bearer token whose
//! verified `key` claim matches the room being joined. The gate never
//! learns passwords; password checks happen at token minting time in the
//! room-auth REST handler.

use common::jwt::{self, RoomClaims};
use common::secret::{ExposeSecret, SecretString};
use tracing::debug;

use crate::errors::HubError;

/// Verifies room tokens and gates protected-room joins.
#[derive(Clone)]
pub struct AuthGate {
    secret: SecretString,
}

impl AuthGate {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Mint a room token for `key`.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Internal` if signing fails.
    pub fn issue(&self, key: &str) -> Result<String, HubError> {
        jwt::issue_room_token(
            key,
            self.secret.expose_secret().as_bytes(),
            jwt::ROOM_TOKEN_TTL,
        )
        .map_err(|_| HubError::Internal)
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `HubError::InvalidToken` on any verification failure.
    pub fn verify(&self, token: &str) -> Result<RoomClaims, HubError> {
        jwt::verify_room_token(token, self.secret.expose_secret().as_bytes())
            .map_err(HubError::from)
    }

    /// Gate a join to `key`.
    ///
    /// Open rooms admit any join. Protected rooms require a token that
    /// verifies and whose key claim matches the room.
    ///
    /// # Errors
    ///
    /// - `HubError::Unauthorized` when a protected room is joined without
    ///   a token, or with a token minted for a different room
    /// - `HubError::InvalidToken` when the token fails verification
    pub fn authorize_join(
        &self,
        key: &str,
        token: Option<&str>,
        protected: bool,
    ) -> Result<(), HubError> {
        if !protected {
            return Ok(());
        }

        let Some(token) = token else {
            debug!(target: "hub.auth", room_key = %key, "Protected room joined without token");
            return Err(HubError::Unauthorized(key.to_string()));
        };

        let claims = self.verify(token)?;
        if claims.key != key {
            debug!(
                target: "hub.auth",
                room_key = %key,
                "Token key claim does not match joined room"
            );
            return Err(HubError::Unauthorized(key.to_string()));
        }

        Ok(())
    }
}
