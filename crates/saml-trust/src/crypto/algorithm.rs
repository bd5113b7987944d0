//! Closed algorithm registry for XML signatures and XML encryption.
//!
//! Algorithm identifiers are enums rather than free-form URI strings so the
//! mismatch-detection and key-cast logic is exhaustively checked.

use std::fmt;

use openssl::hash::MessageDigest;
use openssl::rsa::Padding;
use openssl::symm::Cipher;

/// Every algorithm a key can be tagged with: RSA signature algorithms,
/// RSA key-transport algorithms and symmetric block ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptoAlgorithm {
    RsaSha1,
    RsaSha256,
    RsaSha384,
    RsaSha512,
    Rsa15,
    RsaOaepMgf1p,
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    TripleDesCbc,
}

impl CryptoAlgorithm {
    pub fn uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
            Self::Rsa15 => "http://www.w3.org/2001/04/xmlenc#rsa-1_5",
            Self::RsaOaepMgf1p => "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p",
            Self::Aes128Cbc => "http://www.w3.org/2001/04/xmlenc#aes128-cbc",
            Self::Aes192Cbc => "http://www.w3.org/2001/04/xmlenc#aes192-cbc",
            Self::Aes256Cbc => "http://www.w3.org/2001/04/xmlenc#aes256-cbc",
            Self::TripleDesCbc => "http://www.w3.org/2001/04/xmlenc#tripledes-cbc",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#rsa-sha1" => Some(Self::RsaSha1),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => Some(Self::RsaSha256),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384" => Some(Self::RsaSha384),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" => Some(Self::RsaSha512),
            "http://www.w3.org/2001/04/xmlenc#rsa-1_5" => Some(Self::Rsa15),
            "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p" => Some(Self::RsaOaepMgf1p),
            "http://www.w3.org/2001/04/xmlenc#aes128-cbc" => Some(Self::Aes128Cbc),
            "http://www.w3.org/2001/04/xmlenc#aes192-cbc" => Some(Self::Aes192Cbc),
            "http://www.w3.org/2001/04/xmlenc#aes256-cbc" => Some(Self::Aes256Cbc),
            "http://www.w3.org/2001/04/xmlenc#tripledes-cbc" => Some(Self::TripleDesCbc),
            _ => None,
        }
    }

    pub fn is_signature(self) -> bool {
        matches!(
            self,
            Self::RsaSha1 | Self::RsaSha256 | Self::RsaSha384 | Self::RsaSha512
        )
    }

    pub fn is_key_transport(self) -> bool {
        matches!(self, Self::Rsa15 | Self::RsaOaepMgf1p)
    }

    pub fn is_block_cipher(self) -> bool {
        matches!(
            self,
            Self::Aes128Cbc | Self::Aes192Cbc | Self::Aes256Cbc | Self::TripleDesCbc
        )
    }

    /// Digest used by a signature algorithm.
    pub fn message_digest(self) -> Option<MessageDigest> {
        match self {
            Self::RsaSha1 => Some(MessageDigest::sha1()),
            Self::RsaSha256 => Some(MessageDigest::sha256()),
            Self::RsaSha384 => Some(MessageDigest::sha384()),
            Self::RsaSha512 => Some(MessageDigest::sha512()),
            _ => None,
        }
    }

    /// Reference digest URI matching a signature algorithm.
    pub fn digest_uri(self) -> Option<&'static str> {
        match self {
            Self::RsaSha1 => Some("http://www.w3.org/2000/09/xmldsig#sha1"),
            Self::RsaSha256 => Some("http://www.w3.org/2001/04/xmlenc#sha256"),
            Self::RsaSha384 => Some("http://www.w3.org/2001/04/xmldsig-more#sha384"),
            Self::RsaSha512 => Some("http://www.w3.org/2001/04/xmlenc#sha512"),
            _ => None,
        }
    }

    /// Key size in bytes for a block cipher.
    pub fn key_size(self) -> Option<usize> {
        match self {
            Self::Aes128Cbc => Some(16),
            Self::Aes192Cbc => Some(24),
            Self::Aes256Cbc => Some(32),
            Self::TripleDesCbc => Some(24),
            _ => None,
        }
    }

    pub fn cipher(self) -> Option<Cipher> {
        match self {
            Self::Aes128Cbc => Some(Cipher::aes_128_cbc()),
            Self::Aes192Cbc => Some(Cipher::aes_192_cbc()),
            Self::Aes256Cbc => Some(Cipher::aes_256_cbc()),
            Self::TripleDesCbc => Some(Cipher::des_ede3_cbc()),
            _ => None,
        }
    }

    /// RSA padding for a key-transport algorithm.
    pub fn rsa_padding(self) -> Option<Padding> {
        match self {
            Self::Rsa15 => Some(Padding::PKCS1),
            Self::RsaOaepMgf1p => Some(Padding::PKCS1_OAEP),
            _ => None,
        }
    }
}

impl fmt::Display for CryptoAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Digest for a reference `DigestMethod` URI.
pub fn digest_from_uri(uri: &str) -> Option<MessageDigest> {
    match uri {
        "http://www.w3.org/2000/09/xmldsig#sha1" => Some(MessageDigest::sha1()),
        "http://www.w3.org/2001/04/xmlenc#sha256" => Some(MessageDigest::sha256()),
        "http://www.w3.org/2001/04/xmldsig-more#sha384" => Some(MessageDigest::sha384()),
        "http://www.w3.org/2001/04/xmlenc#sha512" => Some(MessageDigest::sha512()),
        _ => None,
    }
}

/// Digest algorithms accepted for certificate fingerprints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FingerprintAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl FingerprintAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn message_digest(self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha256 => MessageDigest::sha256(),
            Self::Sha384 => MessageDigest::sha384(),
            Self::Sha512 => MessageDigest::sha512(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CryptoAlgorithm; 10] = [
        CryptoAlgorithm::RsaSha1,
        CryptoAlgorithm::RsaSha256,
        CryptoAlgorithm::RsaSha384,
        CryptoAlgorithm::RsaSha512,
        CryptoAlgorithm::Rsa15,
        CryptoAlgorithm::RsaOaepMgf1p,
        CryptoAlgorithm::Aes128Cbc,
        CryptoAlgorithm::Aes192Cbc,
        CryptoAlgorithm::Aes256Cbc,
        CryptoAlgorithm::TripleDesCbc,
    ];

    #[test]
    fn test_uri_round_trip() {
        for algorithm in ALL {
            assert_eq!(CryptoAlgorithm::from_uri(algorithm.uri()), Some(algorithm));
        }
        assert_eq!(CryptoAlgorithm::from_uri("urn:nonsense"), None);
    }

    #[test]
    fn test_groups_are_disjoint_and_total() {
        for algorithm in ALL {
            let groups = [
                algorithm.is_signature(),
                algorithm.is_key_transport(),
                algorithm.is_block_cipher(),
            ];
            assert_eq!(groups.iter().filter(|g| **g).count(), 1, "{algorithm}");
        }
    }

    #[test]
    fn test_block_cipher_key_sizes() {
        assert_eq!(CryptoAlgorithm::Aes128Cbc.key_size(), Some(16));
        assert_eq!(CryptoAlgorithm::Aes192Cbc.key_size(), Some(24));
        assert_eq!(CryptoAlgorithm::Aes256Cbc.key_size(), Some(32));
        assert_eq!(CryptoAlgorithm::TripleDesCbc.key_size(), Some(24));
        assert_eq!(CryptoAlgorithm::Rsa15.key_size(), None);
    }

    #[test]
    fn test_signature_digest_pairing() {
        assert_eq!(
            CryptoAlgorithm::RsaSha256.digest_uri(),
            Some("http://www.w3.org/2001/04/xmlenc#sha256")
        );
        assert!(CryptoAlgorithm::Aes128Cbc.digest_uri().is_none());
        assert!(digest_from_uri("http://www.w3.org/2000/09/xmldsig#sha1").is_some());
        assert!(digest_from_uri("urn:nonsense").is_none());
    }

    #[test]
    fn test_fingerprint_algorithm_names() {
        assert_eq!(
            FingerprintAlgorithm::from_name("sha256"),
            Some(FingerprintAlgorithm::Sha256)
        );
        assert_eq!(FingerprintAlgorithm::from_name("md5"), None);
        assert_eq!(FingerprintAlgorithm::default(), FingerprintAlgorithm::Sha1);
    }
}
