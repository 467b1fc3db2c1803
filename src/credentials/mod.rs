//! Credential contracts: secret hashing, claim signing and identity
//! resolution.

pub mod hashing;
pub mod service;
pub mod token;

pub use hashing::{Argon2SecretHasher, SecretHasher};
pub use service::{CredentialService, DirectoryCredentials, SignedClaims};
pub use token::{ClaimSigner, IdentityClaims};
