//! Ephemeral credentials for ad-hoc share sessions.
//!
//! A credential is a short mixed-case alphanumeric string the host reads out
//! (or pastes) to the person joining.  It is drawn uniformly from
//! `[A-Za-z0-9]`, so it never contains the token field separator.
//!
//! Credentials are **not** key material.  Keys for sealed tokens come from the
//! OS CSPRNG via [`crate::SecretKey::generate`].

use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;

/// Length used when the caller does not ask for a specific one.
pub const DEFAULT_CREDENTIAL_LENGTH: usize = 8;

/// Errors from the credential generator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// A zero-length credential was requested.
    #[error("credential length must be at least 1")]
    ZeroLength,
}

/// Generates a credential of `length` characters using the thread-local RNG.
///
/// # Errors
///
/// Returns [`CredentialError::ZeroLength`] when `length` is 0.
///
/// # Example
///
/// ```rust
/// use deskshare_core::{generate_credential, DEFAULT_CREDENTIAL_LENGTH};
///
/// let password = generate_credential(DEFAULT_CREDENTIAL_LENGTH).unwrap();
/// assert_eq!(password.len(), 8);
/// assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
/// ```
pub fn generate_credential(length: usize) -> Result<String, CredentialError> {
    generate_credential_with(&mut rand::thread_rng(), length)
}

/// Generates a credential from an explicit random source.
///
/// # Errors
///
/// Returns [`CredentialError::ZeroLength`] when `length` is 0.
pub fn generate_credential_with<R: Rng + ?Sized>(
    rng: &mut R,
    length: usize,
) -> Result<String, CredentialError> {
    if length == 0 {
        return Err(CredentialError::ZeroLength);
    }
    Ok(rng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_credential_has_requested_length() {
        for len in [1, 8, 32] {
            assert_eq!(generate_credential(len).unwrap().len(), len);
        }
    }

    #[test]
    fn test_generate_credential_is_alphanumeric() {
        let cred = generate_credential(64).unwrap();
        assert!(cred.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_credential_rejects_zero_length() {
        assert_eq!(generate_credential(0), Err(CredentialError::ZeroLength));
    }

    #[test]
    fn test_generate_credential_with_seeded_rng_is_deterministic() {
        let a = generate_credential_with(&mut StdRng::seed_from_u64(7), 12).unwrap();
        let b = generate_credential_with(&mut StdRng::seed_from_u64(7), 12).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_generated_credential_is_accepted_by_descriptor() {
        let cred = generate_credential(DEFAULT_CREDENTIAL_LENGTH).unwrap();
        let d = crate::EndpointDescriptor::new("10.0.0.5", crate::AccessMode::FullControl)
            .unwrap()
            .with_credential(cred);
        assert!(d.is_ok());
    }
}
