//! Key material for signing, key transport and symmetric encryption.

use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::x509::X509;
use zeroize::Zeroizing;

use crate::crypto::algorithm::CryptoAlgorithm;
use crate::crypto::certs::{format_cert, format_private_key};
use crate::error::{TrustError, TrustResult};

/// An asymmetric key or symmetric session key tagged with the algorithm it
/// is meant for.
///
/// Keys are supplied per operation and never persisted by this crate.
/// Symmetric bytes are zeroized when the key is dropped.
#[derive(Clone)]
pub struct SecurityKey {
    algorithm: CryptoAlgorithm,
    material: KeyMaterial,
}

#[derive(Clone)]
enum KeyMaterial {
    Public(PKey<Public>),
    Private(PKey<Private>),
    Symmetric(Zeroizing<Vec<u8>>),
}

impl SecurityKey {
    /// Public key taken from an X.509 certificate (PEM, with or without
    /// delimiters).
    pub fn from_certificate_pem(cert: &str, algorithm: CryptoAlgorithm) -> TrustResult<Self> {
        let pem = format_cert(cert, true);
        let x509 = X509::from_pem(pem.as_bytes())
            .map_err(|e| TrustError::Certificate(e.to_string()))?;
        let key = x509
            .public_key()
            .map_err(|e| TrustError::Certificate(e.to_string()))?;
        Ok(Self {
            algorithm,
            material: KeyMaterial::Public(key),
        })
    }

    /// Public key in SubjectPublicKeyInfo PEM form.
    pub fn from_public_pem(pem: &str, algorithm: CryptoAlgorithm) -> TrustResult<Self> {
        let key = PKey::public_key_from_pem(pem.as_bytes())
            .map_err(|e| TrustError::Certificate(e.to_string()))?;
        Ok(Self {
            algorithm,
            material: KeyMaterial::Public(key),
        })
    }

    /// Private key (PKCS#8, PKCS#1 or headerless base64).
    pub fn from_private_pem(pem: &str, algorithm: CryptoAlgorithm) -> TrustResult<Self> {
        let pem = format_private_key(pem, true);
        let key = PKey::private_key_from_pem(pem.as_bytes())
            .map_err(|e| TrustError::PrivateKey(e.to_string()))?;
        Ok(Self {
            algorithm,
            material: KeyMaterial::Private(key),
        })
    }

    /// Symmetric key from raw bytes.
    pub fn from_symmetric(bytes: &[u8], algorithm: CryptoAlgorithm) -> Self {
        Self {
            algorithm,
            material: KeyMaterial::Symmetric(Zeroizing::new(bytes.to_vec())),
        }
    }

    /// A fresh random session key sized for the given block cipher.
    pub fn generate_session_key(algorithm: CryptoAlgorithm) -> TrustResult<Self> {
        let size = algorithm
            .key_size()
            .ok_or_else(|| TrustError::UnknownKeySize(algorithm.uri().to_string()))?;
        let mut bytes = Zeroizing::new(vec![0u8; size]);
        openssl::rand::rand_bytes(&mut bytes)?;
        Ok(Self {
            algorithm,
            material: KeyMaterial::Symmetric(bytes),
        })
    }

    pub fn algorithm(&self) -> CryptoAlgorithm {
        self.algorithm
    }

    /// The public half, rebuilt from the private key when needed.
    pub(crate) fn public_key(&self) -> TrustResult<PKey<Public>> {
        match &self.material {
            KeyMaterial::Public(key) => Ok(key.clone()),
            KeyMaterial::Private(key) => {
                let pem = key.public_key_to_pem()?;
                PKey::public_key_from_pem(&pem).map_err(TrustError::Crypto)
            }
            KeyMaterial::Symmetric(_) => Err(TrustError::Certificate(
                "symmetric key has no public half".into(),
            )),
        }
    }

    pub(crate) fn private_key(&self) -> TrustResult<&PKey<Private>> {
        match &self.material {
            KeyMaterial::Private(key) => Ok(key),
            _ => Err(TrustError::PrivateKey(
                "operation requires a private key".into(),
            )),
        }
    }

    pub(crate) fn symmetric_bytes(&self) -> TrustResult<&[u8]> {
        match &self.material {
            KeyMaterial::Symmetric(bytes) => Ok(bytes),
            _ => Err(TrustError::UnknownKeySize(
                "operation requires a symmetric key".into(),
            )),
        }
    }

    /// SHA-1 of the public parameters (SubjectPublicKeyInfo DER); input to
    /// the key-oracle fallback derivation.
    pub(crate) fn public_params_digest(&self) -> TrustResult<Vec<u8>> {
        let der = match &self.material {
            KeyMaterial::Public(key) => key.public_key_to_der()?,
            KeyMaterial::Private(key) => key.public_key_to_der()?,
            KeyMaterial::Symmetric(_) => {
                return Err(TrustError::Certificate(
                    "symmetric key has no public parameters".into(),
                ))
            }
        };
        Ok(openssl::hash::hash(MessageDigest::sha1(), &der)?.to_vec())
    }
}

/// Re-tags a key with a different algorithm, rebuilding it from the
/// extracted public parameters. A no-op when the tag already matches.
/// Only the public half can be re-tagged; symmetric keys refuse to cast.
pub fn cast_key(key: &SecurityKey, algorithm: CryptoAlgorithm) -> TrustResult<SecurityKey> {
    if key.algorithm == algorithm {
        return Ok(key.clone());
    }
    let pem = match &key.material {
        KeyMaterial::Public(key) => key.public_key_to_pem()?,
        KeyMaterial::Private(key) => key.public_key_to_pem()?,
        KeyMaterial::Symmetric(_) => {
            return Err(TrustError::Certificate(
                "cannot rebuild a symmetric key under a new algorithm".into(),
            ))
        }
    };
    let pem = String::from_utf8(pem)
        .map_err(|e| TrustError::Certificate(format!("public key PEM is not UTF-8: {e}")))?;
    SecurityKey::from_public_pem(&pem, algorithm)
}
