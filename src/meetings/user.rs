use serde::{Deserialize, Serialize};

use super::id::Id;

/// A registered account. The password hash stays server-side; the web layer
/// maps users to a client shape without it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

impl User {
    pub fn new(name: String, email: String, password_hash: String) -> User {
        User {
            id: Id::new(),
            name,
            email,
            password_hash,
        }
    }
}
