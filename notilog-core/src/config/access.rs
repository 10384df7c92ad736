//! Credentials for the admin API and for event producers.

use argon2::{Argon2, PasswordHash, PasswordVerifier};

/// Admin configuration with hashed secret.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// The argon2 PHC string of the admin secret.
    pub secret_hash: String,
}

impl AdminConfig {
    pub fn new(secret_hash: String) -> Self {
        Self { secret_hash }
    }

    /// Verify a plaintext secret against the stored hash.
    pub fn verify_secret(&self, plaintext: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(&self.secret_hash) else {
            return false;
        };

        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

/// Shared HMAC key used by producers to sign `POST /events` bodies.
#[derive(Clone)]
pub struct ProducerConfig {
    secret: Box<[u8]>,
}

impl ProducerConfig {
    pub fn new(secret: impl Into<Box<[u8]>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for ProducerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}
