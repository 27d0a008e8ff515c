use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::store::{NewUser, StoreError, User, UserStore};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("token subject is not a user id")]
    InvalidSubject,
    #[error("token lifetime pushes the expiry out of range")]
    ExpiryOutOfRange,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
    iat: usize,
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// A stored hash that fails to parse counts as a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// Issues and checks the bearer tokens handed out at login.
#[derive(Clone)]
pub struct Tokens {
    secret: Arc<[u8]>,
    ttl: Duration,
}

impl Tokens {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self { secret: Arc::from(secret.as_bytes()), ttl }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now.checked_add_signed(self.ttl).ok_or(AuthError::ExpiryOutOfRange)?;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))?)
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        let data = decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &Validation::default())?;
        Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidSubject)
    }
}

/// Make sure the account exists, creating it on first start.
pub async fn ensure_user(users: &dyn UserStore, username: &str, password: &str) -> Result<User, AuthError> {
    if let Some(user) = users.find_user_by_username(username).await? {
        return Ok(user);
    }
    let password_hash = hash_password(password)?;
    let user = users
        .create_user(NewUser { username: username.to_string(), password_hash })
        .await?;
    info!(username, "created seed user");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("password").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("password", &hash));
        assert!(!verify_password("Password", &hash));
        assert!(!verify_password("password", "not a phc string"));
    }

    #[test]
    fn tokens_carry_the_user_id() {
        let tokens = Tokens::new("test-secret", Duration::hours(1));
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id).unwrap();

        assert_eq!(tokens.verify(&token).unwrap(), user_id);

        let other = Tokens::new("other-secret", Duration::hours(1));
        assert!(matches!(other.verify(&token), Err(AuthError::Token(_))));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let tokens = Tokens::new("test-secret", Duration::hours(-2));
        let token = tokens.issue(Uuid::new_v4()).unwrap();
        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn oversized_lifetimes_fail_instead_of_panicking() {
        let tokens = Tokens::new("test-secret", Duration::days(365_000_000));
        assert!(matches!(tokens.issue(Uuid::new_v4()), Err(AuthError::ExpiryOutOfRange)));
    }

    #[tokio::test]
    async fn ensure_user_is_idempotent() {
        let store = MemoryStore::new();
        let first = ensure_user(&store, "meteorite", "password").await.unwrap();
        let second = ensure_user(&store, "meteorite", "ignored").await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(verify_password("password", &second.password_hash));
    }
}
