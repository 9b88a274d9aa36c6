pub mod credentials;
pub mod tokens;

pub use credentials::{Argon2Verifier, CredentialVerifier};
pub use tokens::{HmacTokenIssuer, MIN_SECRET_LEN, TokenError, TokenIssuer, TokenPurpose};
