use crate::config::HashKind;
use crate::error::{Error, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use scrypt::Scrypt;
use std::sync::Arc;

/// Password hashing capability supplied to the user providers by the host.
pub trait Hasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Returns the hasher for the configured algorithm.
pub fn for_kind(kind: HashKind) -> Arc<dyn Hasher> {
    match kind {
        HashKind::Argon2 => Arc::new(Argon2Hasher),
        HashKind::Bcrypt => Arc::new(BcryptHasher),
        HashKind::Scrypt => Arc::new(ScryptHasher),
    }
}

pub struct Argon2Hasher;

impl Hasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        use argon2::password_hash::{rand_core::OsRng, SaltString};

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Hash(e.to_string()))?;

        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        if let Ok(parsed_hash) = PasswordHash::new(hash) {
            Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok()
        } else {
            false
        }
    }
}

pub struct BcryptHasher;

impl Hasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| Error::Hash(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }
}

pub struct ScryptHasher;

impl Hasher for ScryptHasher {
    fn hash(&self, password: &str) -> Result<String> {
        use scrypt::password_hash::{rand_core::OsRng, SaltString};

        let salt = SaltString::generate(&mut OsRng);
        let hash = Scrypt
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Hash(e.to_string()))?;

        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        if let Ok(parsed_hash) = PasswordHash::new(hash) {
            Scrypt.verify_password(password.as_bytes(), &parsed_hash).is_ok()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(hasher: &dyn Hasher) {
        let hash = hasher.hash("s3cret").unwrap();
        assert!(hasher.verify("s3cret", &hash));
        assert!(!hasher.verify("wrong", &hash));
    }

    #[test]
    fn argon2_round_trip() {
        round_trip(&Argon2Hasher);
    }

    #[test]
    fn bcrypt_round_trip() {
        round_trip(&BcryptHasher);
    }

    #[test]
    fn scrypt_round_trip() {
        round_trip(&ScryptHasher);
    }

    #[test]
    fn for_kind_selects_the_configured_algorithm() {
        let hasher = for_kind(HashKind::Bcrypt);
        let hash = hasher.hash("s3cret").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(hasher.verify("s3cret", &hash));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!Argon2Hasher.verify("s3cret", "not-a-hash"));
        assert!(!BcryptHasher.verify("s3cret", "not-a-hash"));
        assert!(!ScryptHasher.verify("s3cret", "not-a-hash"));
    }
}
