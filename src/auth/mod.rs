//! Credential and token service: password hashing, signed session tokens and
//! single-use password-reset secrets.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Reset secrets are valid for ten minutes after issuance.
const RESET_SECRET_TTL_MINUTES: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,
    #[error("Token expired")]
    Expired,
}

/// Claims embedded in a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: String,
    /// Email verification state at issuance time.
    pub verified: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Issue a signed, time-limited session token for a user.
pub fn issue_session_token(
    secret: &str,
    user_id: &str,
    verified: bool,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = SessionClaims {
        sub: user_id.to_string(),
        verified,
        iat: now.timestamp(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a session token and return its claims.
pub fn verify_session_token(secret: &str, token: &str) -> Result<SessionClaims, TokenError> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}

/// A freshly issued password-reset secret. Only the digest and expiry are
/// persisted; the plaintext goes into the reset email and is never stored.
pub struct ResetSecret {
    pub plaintext: String,
    pub digest: String,
    pub expiry: DateTime<Utc>,
}

/// Issue a password-reset secret: 32 random bytes, hex encoded.
pub fn issue_reset_secret() -> ResetSecret {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    let plaintext = hex::encode(bytes);
    let digest = digest_reset_secret(&plaintext);
    ResetSecret {
        plaintext,
        digest,
        expiry: Utc::now() + Duration::minutes(RESET_SECRET_TTL_MINUTES),
    }
}

/// SHA-256 digest of a reset secret, as stored on the user record.
pub fn digest_reset_secret(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("Str0ng!Pass").unwrap();
        assert_ne!(hash, "Str0ng!Pass");
        assert!(verify_password("Str0ng!Pass", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn session_token_round_trip() {
        let token = issue_session_token("secret", "user-1", true, 24).unwrap();
        let claims = verify_session_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(claims.verified);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn session_token_rejects_wrong_secret() {
        let token = issue_session_token("secret", "user-1", false, 24).unwrap();
        assert!(matches!(
            verify_session_token("other", &token),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn session_token_rejects_expired() {
        // Negative lifetime puts exp in the past.
        let token = issue_session_token("secret", "user-1", false, -2).unwrap();
        assert!(matches!(
            verify_session_token("secret", &token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn reset_secret_digest_matches() {
        let secret = issue_reset_secret();
        assert_eq!(secret.plaintext.len(), 64);
        assert_eq!(digest_reset_secret(&secret.plaintext), secret.digest);
        assert!(secret.expiry > Utc::now());
    }

    #[test]
    fn reset_secrets_are_unique() {
        assert_ne!(issue_reset_secret().plaintext, issue_reset_secret().plaintext);
    }
}
