//! Error types for the trust core.

use thiserror::Error;

/// Result type for trust core operations
pub type TrustResult<T> = Result<T, TrustError>;

/// Errors raised by XML loading, schema validation, temporal math and the
/// signature/encryption engines.
///
/// Signature and decryption errors fail closed: a missing key, an
/// unlocatable key-info block or an algorithm mismatch is always an error,
/// never an implicit pass.
#[derive(Debug, Error)]
pub enum TrustError {
    /// XML text could not be parsed into a document
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    /// Input contained a literal entity declaration
    #[error("Detected use of ENTITY in XML, disabled to prevent XXE/XEE attacks")]
    EntityDeclarationDetected,

    /// Timestamp text does not match the strict SAML2 form
    #[error("Invalid SAML2 timestamp: {0}")]
    InvalidTimestamp(String),

    /// Duration text does not match the strict ISO 8601 grammar
    #[error("Invalid ISO 8601 duration: {0}")]
    InvalidDuration(String),

    /// The supplied XSD could not be compiled
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Document failed schema validation; carries every collected diagnostic
    #[error("Schema validation failed with {} error(s)", .0.len())]
    SchemaViolation(Vec<String>),

    /// No `ds:Signature` node in the document
    #[error("Cannot locate Signature node")]
    MissingSignatureNode,

    /// The signing key could not be identified
    #[error("Cannot identify the signing key: {0}")]
    MissingKey(String),

    /// Reference digest validation failed
    #[error("Reference validation failed: {0}")]
    ReferenceValidation(String),

    /// No usable algorithm declared on the encrypted data
    #[error("Could not locate key algorithm in encrypted data")]
    KeyAlgorithmNotLocatable,

    /// No `ds:KeyInfo` for the encrypted key
    #[error("Could not locate KeyInfo for the encrypted key")]
    KeyInfoNotLocatable,

    /// Caller key algorithm does not match the algorithm declared in the message
    #[error("Algorithm mismatch between input key and key used to encrypt the message: key was {key}, message was {message}")]
    AlgorithmMismatch { key: String, message: String },

    /// No key size known for the declared encryption algorithm
    #[error("Unknown key size for encryption algorithm: {0}")]
    UnknownKeySize(String),

    /// Decrypted bytes did not re-parse as XML
    #[error("Failed to parse decrypted XML")]
    DecryptedXmlUnparsable,

    /// Decryption produced no element
    #[error("Missing encrypted element")]
    MissingDecryptedElement,

    /// Signature insertion point cannot be determined
    #[error("Ambiguous signature insertion point: expected a single Issuer child, found {0}")]
    AmbiguousInsertionPoint(usize),

    /// Certificate parsing or usage error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Private key parsing or usage error
    #[error("Private key error: {0}")]
    PrivateKey(String),

    /// XPath setup or evaluation failure
    #[error("XPath evaluation failed: {0}")]
    XPath(String),

    /// Underlying cryptographic operation failed
    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
}
