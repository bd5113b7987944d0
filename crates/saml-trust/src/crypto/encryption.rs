//! Hybrid XML encryption for identifier elements.
//!
//! Encryption wraps a fresh symmetric session key under the recipient
//! certificate's RSA public key (key transport) and encrypts the serialized
//! element under the session key. Decryption reverses both steps, with
//! algorithm negotiation checked against the caller's key.

use base64::{engine::general_purpose::STANDARD, Engine};
use libxml::tree::{Document, Node};
use openssl::hash::MessageDigest;
use openssl::symm::{Crypter, Mode};
use zeroize::Zeroizing;

use crate::constants::{NS_DS, NS_SAML, NS_XENC, NS_XSI, XMLENC_ELEMENT_TYPE};
use crate::crypto::algorithm::CryptoAlgorithm;
use crate::crypto::decode_xml_base64;
use crate::crypto::keys::SecurityKey;
use crate::error::{TrustError, TrustResult};
use crate::xml::{load_xml, xml_escape, SamlXPath};

/// Builds a `saml:NameID` element, encrypting it into a `saml:EncryptedID`
/// wrapper when a recipient certificate is supplied.
///
/// Without a certificate the plain serialized element is returned. With
/// one, a fresh AES-128-CBC session key encrypts the element and is itself
/// wrapped under the certificate's RSA key with PKCS#1 v1.5 key transport.
pub fn encrypt_name_id(
    value: &str,
    sp_name_qualifier: Option<&str>,
    format: &str,
    certificate: Option<&str>,
) -> TrustResult<String> {
    let mut name_id = String::new();
    name_id.push_str("<saml:NameID xmlns:saml=\"");
    name_id.push_str(NS_SAML);
    name_id.push('"');
    if let Some(qualifier) = sp_name_qualifier {
        name_id.push_str(" SPNameQualifier=\"");
        name_id.push_str(&xml_escape(qualifier));
        name_id.push('"');
    }
    name_id.push_str(" Format=\"");
    name_id.push_str(&xml_escape(format));
    name_id.push_str("\">");
    name_id.push_str(&xml_escape(value));
    name_id.push_str("</saml:NameID>");

    let Some(certificate) = certificate else {
        return Ok(name_id);
    };

    let transport_key = SecurityKey::from_certificate_pem(certificate, CryptoAlgorithm::Rsa15)?;
    let session_key = SecurityKey::generate_session_key(CryptoAlgorithm::Aes128Cbc)?;

    let wrapped_key_b64 = wrap_session_key(&transport_key, &session_key)?;
    let cipher_value_b64 = encrypt_data(&session_key, name_id.as_bytes())?;

    Ok(format!(
        "<saml:EncryptedID xmlns:saml=\"{NS_SAML}\">\
         <xenc:EncryptedData xmlns:xenc=\"{NS_XENC}\" Type=\"{XMLENC_ELEMENT_TYPE}\">\
         <xenc:EncryptionMethod Algorithm=\"{data_algorithm}\"/>\
         <ds:KeyInfo xmlns:ds=\"{NS_DS}\">\
         <xenc:EncryptedKey>\
         <xenc:EncryptionMethod Algorithm=\"{key_algorithm}\"/>\
         <xenc:CipherData><xenc:CipherValue>{wrapped_key_b64}</xenc:CipherValue></xenc:CipherData>\
         </xenc:EncryptedKey>\
         </ds:KeyInfo>\
         <xenc:CipherData><xenc:CipherValue>{cipher_value_b64}</xenc:CipherValue></xenc:CipherData>\
         </xenc:EncryptedData>\
         </saml:EncryptedID>",
        data_algorithm = session_key.algorithm().uri(),
        key_algorithm = transport_key.algorithm().uri(),
    ))
}

/// A decrypted element together with the document that owns it.
pub struct DecryptedElement {
    document: Document,
    element: Node,
}

impl DecryptedElement {
    pub fn node(&self) -> &Node {
        &self.element
    }

    pub fn name(&self) -> String {
        self.element.get_name()
    }

    pub fn content(&self) -> String {
        self.element.get_content()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.element.get_attribute(name)
    }

    pub fn to_xml(&self) -> String {
        self.document.node_to_string(&self.element)
    }
}

/// Decrypts an `xenc:EncryptedData` element and returns the element it
/// contained.
///
/// The declared data algorithm and the key-info block are located inside
/// the encrypted structure. A nested `xenc:EncryptedKey` means key
/// transport: the caller's key algorithm must match the declared one
/// (PKCS#1 v1.5 callers are accepted for OAEP-declared messages), and a
/// recovered session key of the wrong length is replaced by key material
/// derived from the ciphertext and the RSA public parameters, so the
/// key-size check is not observable from outside. Without an EncryptedKey
/// the caller's key must itself be the session key.
pub fn decrypt_element(
    document: &Document,
    encrypted_data: &Node,
    input_key: &SecurityKey,
) -> TrustResult<DecryptedElement> {
    let xpath = SamlXPath::new(document)?;

    let data_algorithm = xpath
        .first_within(encrypted_data, "./xenc:EncryptionMethod")?
        .and_then(|method| method.get_attribute("Algorithm"))
        .and_then(|uri| CryptoAlgorithm::from_uri(&uri))
        .filter(|algorithm| algorithm.is_block_cipher())
        .ok_or(TrustError::KeyAlgorithmNotLocatable)?;

    let key_info = xpath
        .first_within(encrypted_data, "./ds:KeyInfo")?
        .ok_or(TrustError::KeyInfoNotLocatable)?;

    let session_key = match xpath.first_within(&key_info, "./xenc:EncryptedKey")? {
        Some(encrypted_key) => {
            let key_algorithm = xpath
                .first_within(&encrypted_key, "./xenc:EncryptionMethod")?
                .and_then(|method| method.get_attribute("Algorithm"))
                .and_then(|uri| CryptoAlgorithm::from_uri(&uri))
                .filter(|algorithm| algorithm.is_key_transport())
                .ok_or(TrustError::KeyAlgorithmNotLocatable)?;

            let mut input_algorithm = input_key.algorithm();
            // legacy PKCS#1 v1.5 keys are accepted for OAEP-declared messages
            if key_algorithm == CryptoAlgorithm::RsaOaepMgf1p
                && input_algorithm == CryptoAlgorithm::Rsa15
            {
                input_algorithm = CryptoAlgorithm::RsaOaepMgf1p;
            }
            if input_algorithm != key_algorithm {
                return Err(TrustError::AlgorithmMismatch {
                    key: input_algorithm.uri().to_string(),
                    message: key_algorithm.uri().to_string(),
                });
            }

            let key_size = data_algorithm
                .key_size()
                .ok_or_else(|| TrustError::UnknownKeySize(data_algorithm.uri().to_string()))?;

            let wrapped = xpath
                .first_within(&encrypted_key, "./xenc:CipherData/xenc:CipherValue")?
                .map(|node| node.get_content())
                .ok_or(TrustError::KeyInfoNotLocatable)?;
            let wrapped = decode_xml_base64(&wrapped).map_err(|_| TrustError::KeyInfoNotLocatable)?;

            let recovered = unwrap_session_key(input_key, key_algorithm, &wrapped)?;
            let key_bytes = if recovered.len() == key_size {
                recovered
            } else {
                derive_fallback_key(&wrapped, input_key, key_size)?
            };
            SecurityKey::from_symmetric(&key_bytes, data_algorithm)
        }
        None => {
            // plain key info: the caller must hold the session key itself
            let input_algorithm = input_key.algorithm();
            if input_algorithm != data_algorithm {
                return Err(TrustError::AlgorithmMismatch {
                    key: input_algorithm.uri().to_string(),
                    message: data_algorithm.uri().to_string(),
                });
            }
            input_key.clone()
        }
    };

    let payload = xpath
        .first_within(encrypted_data, "./xenc:CipherData/xenc:CipherValue")?
        .map(|node| node.get_content())
        .ok_or_else(|| TrustError::MalformedXml("cannot locate encrypted data".into()))?;
    let payload = decode_xml_base64(&payload)
        .map_err(|e| TrustError::MalformedXml(format!("CipherValue is not base64: {e}")))?;

    let plaintext = decrypt_data(&session_key, &payload)?;
    let plaintext =
        String::from_utf8(plaintext).map_err(|_| TrustError::DecryptedXmlUnparsable)?;

    let wrapped_xml =
        format!("<root xmlns:saml=\"{NS_SAML}\" xmlns:xsi=\"{NS_XSI}\">{plaintext}</root>");
    let new_document = load_xml(&wrapped_xml).map_err(|_| TrustError::DecryptedXmlUnparsable)?;
    let element = new_document
        .get_root_element()
        .and_then(|root| root.get_first_element_child())
        .ok_or(TrustError::MissingDecryptedElement)?;

    Ok(DecryptedElement {
        document: new_document,
        element,
    })
}

fn wrap_session_key(transport_key: &SecurityKey, session_key: &SecurityKey) -> TrustResult<String> {
    let padding = transport_key.algorithm().rsa_padding().ok_or_else(|| {
        TrustError::Certificate(format!(
            "{} is not a key-transport algorithm",
            transport_key.algorithm()
        ))
    })?;
    let public_key = transport_key.public_key()?;
    let rsa = public_key
        .rsa()
        .map_err(|e| TrustError::Certificate(e.to_string()))?;

    let mut wrapped = vec![0u8; rsa.size() as usize];
    let written = rsa.public_encrypt(session_key.symmetric_bytes()?, &mut wrapped, padding)?;
    wrapped.truncate(written);
    Ok(STANDARD.encode(wrapped))
}

fn unwrap_session_key(
    input_key: &SecurityKey,
    key_algorithm: CryptoAlgorithm,
    wrapped: &[u8],
) -> TrustResult<Zeroizing<Vec<u8>>> {
    let padding = key_algorithm
        .rsa_padding()
        .ok_or(TrustError::KeyAlgorithmNotLocatable)?;
    let private_key = input_key
        .private_key()
        .map_err(|_| TrustError::MissingKey("decryption requires a private key".into()))?;
    let rsa = private_key
        .rsa()
        .map_err(|e| TrustError::PrivateKey(e.to_string()))?;

    let mut recovered = Zeroizing::new(vec![0u8; rsa.size() as usize]);
    let written = rsa.private_decrypt(wrapped, &mut recovered, padding)?;
    recovered.truncate(written);
    Ok(recovered)
}

/// Replacement key material for a wrong-length recovered session key:
/// sha1(wrapped-ciphertext || sha1(SPKI DER)), truncated or right-padded to
/// the exact required size. Deliberately indistinguishable from a normal
/// decryption to the caller; do not add logging or early returns here.
fn derive_fallback_key(
    wrapped: &[u8],
    input_key: &SecurityKey,
    key_size: usize,
) -> TrustResult<Zeroizing<Vec<u8>>> {
    let params_digest = input_key.public_params_digest()?;
    let mut material = Vec::with_capacity(wrapped.len() + params_digest.len());
    material.extend_from_slice(wrapped);
    material.extend_from_slice(&params_digest);

    let digest = openssl::hash::hash(MessageDigest::sha1(), &material)?;
    let mut key = Zeroizing::new(digest.to_vec());
    key.truncate(key_size);
    while key.len() < key_size {
        key.push(b' ');
    }
    Ok(key)
}

fn encrypt_data(session_key: &SecurityKey, plaintext: &[u8]) -> TrustResult<String> {
    let algorithm = session_key.algorithm();
    let cipher = algorithm
        .cipher()
        .ok_or_else(|| TrustError::UnknownKeySize(algorithm.uri().to_string()))?;

    let mut iv = vec![0u8; cipher.iv_len().unwrap_or_else(|| cipher.block_size())];
    openssl::rand::rand_bytes(&mut iv)?;

    let ciphertext =
        openssl::symm::encrypt(cipher, session_key.symmetric_bytes()?, Some(&iv), plaintext)?;

    let mut payload = iv;
    payload.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(payload))
}

fn decrypt_data(session_key: &SecurityKey, payload: &[u8]) -> TrustResult<Vec<u8>> {
    let algorithm = session_key.algorithm();
    let cipher = algorithm
        .cipher()
        .ok_or_else(|| TrustError::UnknownKeySize(algorithm.uri().to_string()))?;
    let block_size = cipher.block_size();
    let iv_len = cipher.iv_len().unwrap_or(block_size);

    if payload.len() < iv_len + block_size {
        return Err(TrustError::DecryptedXmlUnparsable);
    }
    let (iv, ciphertext) = payload.split_at(iv_len);

    // XML-Enc padding is not strict PKCS#7 (only the final octet is
    // meaningful), so the padding is stripped by hand
    let mut crypter = Crypter::new(
        cipher,
        Mode::Decrypt,
        session_key.symmetric_bytes()?,
        Some(iv),
    )?;
    crypter.pad(false);

    let mut plaintext = vec![0u8; ciphertext.len() + block_size];
    let mut written = crypter.update(ciphertext, &mut plaintext)?;
    written += crypter.finalize(&mut plaintext[written..])?;
    plaintext.truncate(written);

    let pad = plaintext.last().copied().unwrap_or(0) as usize;
    if pad == 0 || pad > block_size || pad > plaintext.len() {
        return Err(TrustError::DecryptedXmlUnparsable);
    }
    plaintext.truncate(plaintext.len() - pad);
    Ok(plaintext)
}
