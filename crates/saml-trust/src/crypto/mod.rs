//! Certificate handling, fingerprints, XML signatures and XML encryption.

pub mod algorithm;
pub mod certs;
pub mod encryption;
pub mod fingerprint;
pub mod keys;
pub mod signature;

use base64::{engine::general_purpose::STANDARD, Engine};

/// Decodes base64 as it appears in XML text nodes, where the payload may be
/// wrapped and indented.
pub(crate) fn decode_xml_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let stripped = input.replace([' ', '\n', '\r', '\t'], "");
    STANDARD.decode(stripped)
}
