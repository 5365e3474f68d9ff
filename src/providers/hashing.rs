//! Hashing Provider
//!
//! Abstract password-hashing contract plus a bcrypt-backed implementation —
//! the idiomatic-Rust analogue of the original's `passlib` bcrypt scheme.

use async_trait::async_trait;

use crate::error::ExternalError;

const PROVIDER: &str = "bcrypt";

/// A pluggable password-hashing backend.
#[async_trait]
pub trait HashingProvider: Send + Sync {
    /// Hash a plain-text password.
    async fn hash(&self, password: &str) -> Result<String, ExternalError>;

    /// Verify a plain-text password against a previously computed hash.
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, ExternalError>;
}

/// Bcrypt-backed `HashingProvider`.
pub struct BcryptHashingProvider {
    cost: u32,
}

impl BcryptHashingProvider {
    pub fn new() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHashingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HashingProvider for BcryptHashingProvider {
    async fn hash(&self, password: &str) -> Result<String, ExternalError> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ExternalError::Failed {
                provider: PROVIDER,
                message: e.to_string(),
            })?
            .map_err(|e| ExternalError::Failed {
                provider: PROVIDER,
                message: e.to_string(),
            })
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, ExternalError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| ExternalError::Failed {
                provider: PROVIDER,
                message: e.to_string(),
            })?
            .map_err(|e| ExternalError::Failed {
                provider: PROVIDER,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify_round_trip() {
        let provider = BcryptHashingProvider::with_cost(4);
        let hash = provider.hash("s3cret").await.unwrap();
        assert!(provider.verify("s3cret", &hash).await.unwrap());
        assert!(!provider.verify("wrong", &hash).await.unwrap());
    }
}
