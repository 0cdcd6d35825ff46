//! User accounts, roles, and bearer token material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ulid::Ulid;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
            Self::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a new account from an already hashed password (see [`hash_password`]).
    pub fn new(name: &str, email: &str, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            role: UserRole::User,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored record of an issued bearer token. The secret itself is never kept.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A freshly issued token: the stored record plus the one-time secret.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub record: AccessToken,
    pub secret: String,
}

impl IssuedToken {
    pub const NAME: &'static str = "auth_token";

    /// Generate a random 32-byte secret for `user_id`.
    pub fn generate(user_id: &str) -> Self {
        let secret = hex::encode(rand::random::<[u8; 32]>());
        Self {
            record: AccessToken {
                id: Ulid::new().to_string(),
                user_id: user_id.to_string(),
                token_hash: hash_token(&secret),
                name: Self::NAME.to_string(),
                created_at: Utc::now(),
            },
            secret,
        }
    }
}

/// Hash a bearer secret for lookup.
pub fn hash_token(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Lowest work factor bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;
/// Highest work factor bcrypt accepts.
pub const MAX_BCRYPT_COST: u32 = 31;

/// Hash a password with bcrypt. CPU heavy; call it off the async runtime.
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Check `password` against a bcrypt hash. A malformed hash never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_verifies_against_own_hash() {
        let stored = hash_password("correct horse", MIN_BCRYPT_COST).unwrap();
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("battery staple", &stored));
    }

    #[test]
    fn password_hashes_are_salted_bcrypt() {
        let first = hash_password("same", MIN_BCRYPT_COST).unwrap();
        assert!(first.starts_with("$2"));
        assert_ne!(first, hash_password("same", MIN_BCRYPT_COST).unwrap());
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "no-separator"));
        assert!(!verify_password("anything", ""));
        // A bare SHA-256 digest is not a password hash.
        assert!(!verify_password("anything", &hash_token("anything")));
    }

    #[test]
    fn cost_out_of_range_is_an_error() {
        assert!(hash_password("password123", MAX_BCRYPT_COST + 1).is_err());
    }

    #[test]
    fn issued_token_stores_only_the_hash() {
        let issued = IssuedToken::generate("u1");
        assert_eq!(issued.secret.len(), 64);
        assert_ne!(issued.record.token_hash, issued.secret);
        assert_eq!(issued.record.token_hash, hash_token(&issued.secret));
        assert_eq!(issued.record.name, "auth_token");
    }

    #[test]
    fn user_serialization_hides_password_hash() {
        let user = User::new("Ada", "ada@example.com", hash_password("password123", MIN_BCRYPT_COST).unwrap());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn role_text_round_trips() {
        assert_eq!(UserRole::SuperAdmin.to_string(), "super_admin");
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
    }
}
