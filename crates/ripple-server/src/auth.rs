//! Bearer credential verification.
//!
//! Tokens are HS256 JWTs minted by the producer service. Verification
//! happens once, before the WebSocket upgrade; the registry only ever sees
//! the resulting [`Identity`] and never re-validates beyond the
//! claimed-vs-verified user check in subscribe.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use ripple_core::Identity;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("missing bearer token")]
    MissingToken,

    /// The credential failed verification (bad signature, expired, garbled).
    #[error("invalid bearer token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Claims carried by a connection token.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id.
    sub: String,
    /// Display name.
    name: String,
    /// Avatar reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avatar: Option<String>,
    /// Expiry as seconds since the epoch.
    exp: u64,
}

/// Verifies bearer tokens and yields identities.
pub struct AuthVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl AuthVerifier {
    /// Create a verifier over an HMAC secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a token and extract the identity it vouches for.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is wrong or the token has expired.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(Identity {
            user_id: data.claims.sub,
            display_name: data.claims.name,
            avatar_url: data.claims.avatar,
        })
    }

    /// Mint a token for an identity, valid for `ttl`.
    ///
    /// The relay itself never issues tokens in production; the producer
    /// service does. Sharing the signing path keeps the two ends of the
    /// contract in one place and gives tests real tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, identity: &Identity, ttl: Duration) -> Result<String, AuthError> {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .saturating_add(ttl.as_secs());

        let claims = Claims {
            sub: identity.user_id.clone(),
            name: identity.display_name.clone(),
            avatar: identity.avatar_url.clone(),
            exp,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }
}
