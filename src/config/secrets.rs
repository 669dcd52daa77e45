//! Secret handling utilities.
//!
//! Re-exports secrecy types and provides the comparison used when
//! checking inbound credentials against configured secrets.

pub use secrecy::{ExposeSecret, SecretString};

use subtle::ConstantTimeEq;

/// Compare a presented credential with a secret in constant time.
///
/// Length differences return early; only the content comparison is
/// constant-time.
pub fn secret_matches(secret: &SecretString, presented: &str) -> bool {
    let expected = secret.expose_secret().as_bytes();
    let presented = presented.as_bytes();
    expected.len() == presented.len() && bool::from(expected.ct_eq(presented))
}
