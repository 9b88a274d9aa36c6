use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand_core::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to hash credential: {0}")]
pub struct CredentialError(String);

/// One-way credential digest. Plaintext passwords never reach the record store.
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, CredentialError>;

    /// Returns `false` for malformed digests instead of failing.
    fn verify(&self, password: &str, digest: &str) -> bool;
}

#[derive(Default)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| CredentialError(err.to_string()))
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(hash) => Argon2::default()
                .verify_password(password.as_bytes(), &hash)
                .is_ok(),
            Err(_) => false,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_round_trip() {
        let verifier = Argon2Verifier;
        let digest = verifier.hash("hunter22").expect("hash");
        assert_ne!(digest, "hunter22");
        assert!(verifier.verify("hunter22", &digest));
        assert!(!verifier.verify("hunter23", &digest));
    }

    #[test]
    fn malformed_digest_never_verifies() {
        assert!(!Argon2Verifier.verify("anything", "not-a-phc-string"));
    }
}
