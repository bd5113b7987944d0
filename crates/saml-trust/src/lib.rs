//! Cryptographic trust core for a SAML 2.0 service provider toolkit.
//!
//! This crate signs and verifies enveloped XML digital signatures, encrypts
//! and decrypts identifier elements, normalizes and fingerprints X.509
//! certificate and key material, performs the SAML2 timestamp and ISO 8601
//! duration arithmetic behind validity windows, and hardens XML parsing
//! against entity-expansion attacks.
//!
//! Protocol message construction, HTTP bindings and configuration
//! validation live in sibling crates; they hand this crate raw XML text and
//! PEM material and never touch cryptographic primitives themselves. No
//! file or network I/O happens here.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod time;
pub mod xml;

pub use crypto::algorithm::{CryptoAlgorithm, FingerprintAlgorithm};
pub use crypto::certs::{format_cert, format_private_key};
pub use crypto::encryption::{decrypt_element, encrypt_name_id, DecryptedElement};
pub use crypto::fingerprint::{calculate_fingerprint, format_fingerprint};
pub use crypto::keys::{cast_key, SecurityKey};
pub use crypto::signature::{sign_document, verify_signature};
pub use error::{TrustError, TrustResult};
pub use time::{
    apply_duration, expire_time, expire_time_at, saml_time_to_unix, unix_to_saml_time,
    DurationExpression, ValidUntil,
};
pub use xml::{
    load_xml, response_status, validate_against_schema, ResponseStatus, SamlXPath, XmlSource,
};

use uuid::Uuid;

/// Generates a unique identifier usable as an XML ID (for assertions and
/// protocol messages).
pub fn generate_unique_id() -> String {
    format!("_{}", Uuid::new_v4().simple())
}
