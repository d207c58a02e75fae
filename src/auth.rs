use anyhow::Result;
use argon2::{
    Argon2,
    password_hash::{
        rand_core::OsRng,
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::runner::RunError;

pub const ENV_DEFAULT_API_KEY: &str = "SEEDGAME_DEFAULT_API_KEY";
pub const ENV_SHARED_PASSWORD: &str = "SEEDGAME_SHARED_PASSWORD";
pub const ENV_SHARED_PASSWORD_HASH: &str = "SEEDGAME_SHARED_PASSWORD_HASH";

/// Private API key plus the shared password that unlocks it for visitors.
/// Not authentication: anyone who knows the password spends the owner's quota.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub default_api_key: Option<String>,
    #[serde(default)]
    pub shared_password: Option<String>,
    /// argon2 PHC string, checked when `shared_password` is unset.
    #[serde(default)]
    pub shared_password_hash: Option<String>,
}

impl Credentials {
    /// Local override file first, environment otherwise.
    pub async fn load(local_file: &Path, api_key_env: &str) -> Result<Self> {
        match tokio::fs::read_to_string(local_file).await {
            Ok(txt) => {
                let creds: Credentials = serde_yaml::from_str(&txt)
                    .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", local_file.display(), e))?;
                tracing::info!(path = %local_file.display(), "credentials loaded from local file");
                Ok(creds)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::from_env(api_key_env)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_env(api_key_env: &str) -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        Self {
            default_api_key: var(ENV_DEFAULT_API_KEY).or_else(|| var(api_key_env)),
            shared_password: var(ENV_SHARED_PASSWORD),
            shared_password_hash: var(ENV_SHARED_PASSWORD_HASH),
        }
    }

    fn is_shared_password(&self, input: &str) -> bool {
        if let Some(pw) = &self.shared_password {
            return pw == input;
        }
        match &self.shared_password_hash {
            Some(hash) => verify_password(input, hash).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "shared password hash is unusable");
                false
            }),
            None => false,
        }
    }

    /// Maps what the user typed to the key actually sent to the provider.
    pub fn resolve(&self, input: &str) -> Result<String, RunError> {
        if input.trim().is_empty() {
            return Err(RunError::MissingCredential);
        }
        if let Some(key) = &self.default_api_key {
            if self.is_shared_password(input) {
                tracing::debug!("shared password matched, using default key");
                return Ok(key.clone());
            }
        }
        Ok(input.to_string())
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("invalid stored password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
