//! Accounts and bearer tokens.
//!
//! Registration and login issue an opaque token; only its SHA-256 hash is
//! stored. Requests present the secret as `Authorization: Bearer <secret>`.

pub mod model;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::error::{DatabaseError, ServiceError};
use crate::store::Store;
use crate::validation::Validator;
use model::{IssuedToken, User, hash_password, hash_token, verify_password};

const MAX_FIELD_CHARS: usize = 255;
const MIN_PASSWORD_CHARS: usize = 8;
const EMAIL_TAKEN: &str = "The email has already been taken.";

/// Registration form.
#[derive(Debug)]
pub struct Registration {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<SecretString>,
}

/// Login form.
#[derive(Debug)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<SecretString>,
}

/// A user together with a freshly issued token secret.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub access_token: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn password_text(password: &Option<SecretString>) -> Option<&str> {
    password.as_ref().map(|p| p.expose_secret())
}

/// Run bcrypt work on the blocking pool.
async fn off_runtime<T, F>(work: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServiceError::PasswordHashing(e.to_string()))
}

/// Account operations over the store.
pub struct AuthService {
    store: Arc<dyn Store>,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, bcrypt_cost: u32) -> Self {
        Self { store, bcrypt_cost }
    }

    async fn issue(&self, user: User) -> Result<Session, ServiceError> {
        let token = IssuedToken::generate(&user.id);
        self.store.insert_token(&token.record).await?;
        debug!(user_id = %user.id, token_id = %token.record.id, "Token issued");
        Ok(Session {
            user,
            access_token: token.secret,
        })
    }

    /// Create an account and log it in.
    pub async fn register(&self, form: Registration) -> Result<Session, ServiceError> {
        let mut v = Validator::new();
        let name = v.required("name", form.name.as_deref()).trim().to_string();
        v.max_chars("name", form.name.as_deref(), MAX_FIELD_CHARS);

        let email = normalize_email(v.required("email", form.email.as_deref()));
        v.email("email", Some(&email));
        v.max_chars("email", Some(&email), MAX_FIELD_CHARS);

        let password = v.required("password", password_text(&form.password));
        v.min_chars("password", Some(password).filter(|p| !p.is_empty()), MIN_PASSWORD_CHARS);

        if !email.is_empty() && self.store.get_user_by_email(&email).await?.is_some() {
            v.reject("email", EMAIL_TAKEN);
        }
        v.finish()?;

        let secret = SecretString::from(password.to_string());
        let cost = self.bcrypt_cost;
        let password_hash = off_runtime(move || hash_password(secret.expose_secret(), cost))
            .await?
            .map_err(|e| ServiceError::PasswordHashing(e.to_string()))?;

        let user = User::new(&name, &email, password_hash);
        self.store.insert_user(&user).await.map_err(|e| match e {
            // Lost a race with a concurrent registration.
            DatabaseError::Constraint(_) => ServiceError::invalid("email", EMAIL_TAKEN),
            e => e.into(),
        })?;
        info!(user_id = %user.id, "User registered");

        self.issue(user).await
    }

    /// Check credentials and issue a new token.
    pub async fn login(&self, form: Credentials) -> Result<Session, ServiceError> {
        let mut v = Validator::new();
        let email = normalize_email(v.required("email", form.email.as_deref()));
        let password = v.required("password", password_text(&form.password));
        v.finish()?;

        let Some(user) = self.store.get_user_by_email(&email).await? else {
            return Err(ServiceError::InvalidCredentials);
        };
        let secret = SecretString::from(password.to_string());
        let stored = user.password_hash.clone();
        if !off_runtime(move || verify_password(secret.expose_secret(), &stored)).await? {
            return Err(ServiceError::InvalidCredentials);
        }
        info!(user_id = %user.id, "User logged in");
        self.issue(user).await
    }

    /// Revoke the presented token. Other tokens of the same user stay valid.
    pub async fn logout(&self, secret: &str) -> Result<(), ServiceError> {
        if self.store.delete_token(&hash_token(secret)).await? {
            debug!("Token revoked");
        }
        Ok(())
    }

    /// Resolve a bearer secret to its user. Never writes.
    pub async fn authenticate(&self, secret: &str) -> Result<User, ServiceError> {
        let token = self
            .store
            .find_token(&hash_token(secret))
            .await?
            .ok_or(ServiceError::Unauthenticated)?;
        self.store
            .get_user(&token.user_id)
            .await?
            .ok_or(ServiceError::Unauthenticated)
    }
}
