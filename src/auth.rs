//! Credential handling: salted password digests and the opaque bearer-token
//! session registry behind the `x-token` header.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::meetings::Id;

pub const MIN_PASSWORD_LEN: usize = 8;

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns `salt$digest` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    format!("{}${}", hex::encode(salt), digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, expected)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    digest(&salt, password) == expected
}

struct Session {
    user: Id,
    expires_at: DateTime<Utc>,
}

/// In-process session registry with a fixed TTL from configuration.
#[derive(Clone)]
pub struct Sessions {
    ttl: Duration,
    inner: Arc<Mutex<HashMap<String, Session>>>,
}

impl Sessions {
    pub fn new(ttl: Duration) -> Sessions {
        Sessions {
            ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn issue(&self, user: &Id, now: DateTime<Utc>) -> String {
        let bytes: [u8; 32] = rand::random();
        let token = hex::encode(bytes);
        self.lock().insert(
            token.clone(),
            Session {
                user: user.clone(),
                expires_at: now + self.ttl,
            },
        );
        token
    }

    /// Resolves a token to its user, dropping it when expired.
    pub fn resolve(&self, token: &str, now: DateTime<Utc>) -> Option<Id> {
        let mut sessions = self.lock();
        match sessions.get(token) {
            Some(session) if session.expires_at > now => Some(session.user.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn revoke(&self, token: &str) {
        self.lock().remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let stored = hash_password("correct horse");
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("wrong horse", &stored));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        assert_ne!(hash_password("secret"), hash_password("secret"));
    }

    #[test]
    fn sessions_expire_and_revoke() {
        let sessions = Sessions::new(Duration::hours(1));
        let user = Id::new();
        let now = Utc::now();
        let token = sessions.issue(&user, now);

        assert_eq!(sessions.resolve(&token, now), Some(user.clone()));
        assert_eq!(sessions.resolve(&token, now + Duration::hours(2)), None);

        let token = sessions.issue(&user, now);
        sessions.revoke(&token);
        assert_eq!(sessions.resolve(&token, now), None);
    }
}
