//! Enveloped XML digital signatures: creation and verification.

use base64::{engine::general_purpose::STANDARD, Engine};
use libxml::tree::{Document, Node};
use openssl::sign::{Signer, Verifier};
use xml_canonicalization::Canonicalizer;

use crate::constants::{ENVELOPED_SIGNATURE, EXC_C14N, NS_DS};
use crate::crypto::algorithm::{digest_from_uri, CryptoAlgorithm, FingerprintAlgorithm};
use crate::crypto::certs::format_cert;
use crate::crypto::decode_xml_base64;
use crate::crypto::fingerprint::{calculate_fingerprint, format_fingerprint};
use crate::crypto::keys::SecurityKey;
use crate::error::{TrustError, TrustResult};
use crate::generate_unique_id;
use crate::xml::{SamlXPath, XmlSource};

/// Protocol messages whose signature goes immediately after their single
/// `saml:Issuer` child instead of in first-child position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolMessage {
    AuthnRequest,
    Response,
    LogoutRequest,
    LogoutResponse,
}

impl ProtocolMessage {
    fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "AuthnRequest" => Some(Self::AuthnRequest),
            "Response" => Some(Self::Response),
            "LogoutRequest" => Some(Self::LogoutRequest),
            "LogoutResponse" => Some(Self::LogoutResponse),
            _ => None,
        }
    }
}

/// Applies exclusive canonicalization (without comments).
pub(crate) fn canonicalize(xml: &str) -> TrustResult<String> {
    let mut output = Vec::new();
    Canonicalizer::read_from_str(xml)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| TrustError::MalformedXml(format!("canonicalization failed: {e}")))?;
    String::from_utf8(output)
        .map_err(|e| TrustError::MalformedXml(format!("canonicalized XML is not UTF-8: {e}")))
}

/// Signs a document with an enveloped signature over its root element and
/// returns the signed serialization.
///
/// The reference digest covers the root under the enveloped-signature and
/// exclusive-C14N transforms; the root's `ID` attribute is reused when
/// present and generated otherwise. The certificate lands in the
/// signature's `KeyInfo` block.
pub fn sign_document(
    xml: XmlSource<'_>,
    private_key: &str,
    certificate: &str,
    algorithm: CryptoAlgorithm,
) -> TrustResult<String> {
    let digest_uri = algorithm.digest_uri().ok_or_else(|| {
        TrustError::PrivateKey(format!("{algorithm} is not a signature algorithm"))
    })?;
    let message_digest = algorithm.message_digest().ok_or_else(|| {
        TrustError::PrivateKey(format!("{algorithm} is not a signature algorithm"))
    })?;

    let document = xml.to_private_document()?;
    let mut root = document
        .get_root_element()
        .ok_or_else(|| TrustError::MalformedXml("document has no root element".into()))?;

    let reference_id = match root.get_attribute("ID") {
        Some(id) => id,
        None => {
            let id = generate_unique_id();
            root.set_attribute("ID", &id)
                .map_err(|e| TrustError::MalformedXml(format!("cannot set ID attribute: {e:?}")))?;
            id
        }
    };

    let serialized = document.node_to_string(&root);
    let digest = openssl::hash::hash(message_digest, canonicalize(&serialized)?.as_bytes())?;
    let digest_b64 = STANDARD.encode(digest);

    let mut signed_info = String::new();
    signed_info.push_str("<ds:SignedInfo xmlns:ds=\"");
    signed_info.push_str(NS_DS);
    signed_info.push_str("\"><ds:CanonicalizationMethod Algorithm=\"");
    signed_info.push_str(EXC_C14N);
    signed_info.push_str("\"/><ds:SignatureMethod Algorithm=\"");
    signed_info.push_str(algorithm.uri());
    signed_info.push_str("\"/><ds:Reference URI=\"#");
    signed_info.push_str(&reference_id);
    signed_info.push_str("\"><ds:Transforms><ds:Transform Algorithm=\"");
    signed_info.push_str(ENVELOPED_SIGNATURE);
    signed_info.push_str("\"/><ds:Transform Algorithm=\"");
    signed_info.push_str(EXC_C14N);
    signed_info.push_str("\"/></ds:Transforms><ds:DigestMethod Algorithm=\"");
    signed_info.push_str(digest_uri);
    signed_info.push_str("\"/><ds:DigestValue>");
    signed_info.push_str(&digest_b64);
    signed_info.push_str("</ds:DigestValue></ds:Reference></ds:SignedInfo>");

    let key = SecurityKey::from_private_pem(private_key, algorithm)?;
    let mut signer = Signer::new(message_digest, key.private_key()?)?;
    signer.update(canonicalize(&signed_info)?.as_bytes())?;
    let signature_b64 = STANDARD.encode(signer.sign_to_vec()?);

    let certificate_b64 = format_cert(certificate, false);
    let signature_xml = format!(
        "<ds:Signature xmlns:ds=\"{NS_DS}\">{signed_info}\
         <ds:SignatureValue>{signature_b64}</ds:SignatureValue>\
         <ds:KeyInfo><ds:X509Data><ds:X509Certificate>{certificate_b64}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>\
         </ds:Signature>"
    );

    let root_qname = qualified_name(&root);
    let insert_at = signature_insertion_offset(&document, &root, &serialized)?;
    let signed = splice(&serialized, insert_at, &signature_xml, &root_qname);

    tracing::debug!(reference_id = %reference_id, algorithm = %algorithm, "signed document");
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{signed}"))
}

/// Verifies the document's enveloped signature.
///
/// With `certificate` supplied, verification runs directly against it.
/// Without one, the certificate embedded in the signature must match the
/// supplied `fingerprint` (normalized on both sides) before any
/// cryptographic check runs; a mismatch returns `Ok(false)`.
///
/// The caller's document is never mutated; verification works on a private
/// copy. Signatures whose first Reference has an empty URI are tolerated by
/// rewriting the URI to the signature parent's `ID`.
pub fn verify_signature(
    xml: XmlSource<'_>,
    certificate: Option<&str>,
    fingerprint: Option<&str>,
    fingerprint_algorithm: FingerprintAlgorithm,
) -> TrustResult<bool> {
    let document = xml.to_private_document()?;
    let xpath = SamlXPath::new(&document)?;

    for signature in xpath.query("//ds:Signature")? {
        let Some(mut reference) = xpath.first_within(&signature, ".//ds:Reference")? else {
            continue;
        };
        if reference.get_attribute("URI").unwrap_or_default().is_empty() {
            if let Some(id) = signature
                .get_parent()
                .and_then(|parent| parent.get_attribute("ID"))
            {
                reference
                    .set_attribute("URI", &format!("#{id}"))
                    .map_err(|e| TrustError::XPath(format!("cannot rewrite Reference URI: {e:?}")))?;
            }
        }
    }

    let signature = xpath
        .first("//ds:Signature")?
        .ok_or(TrustError::MissingSignatureNode)?;

    let algorithm = xpath
        .first_within(&signature, "./ds:SignedInfo/ds:SignatureMethod")?
        .and_then(|method| method.get_attribute("Algorithm"))
        .ok_or_else(|| TrustError::MissingKey("signature declares no SignatureMethod".into()))
        .and_then(|uri| {
            CryptoAlgorithm::from_uri(&uri)
                .filter(|a| a.is_signature())
                .ok_or_else(|| TrustError::MissingKey(format!("unsupported signature algorithm {uri}")))
        })?;

    let signed_info = xpath
        .first_within(&signature, "./ds:SignedInfo")?
        .ok_or(TrustError::MissingSignatureNode)?;
    let canonical_signed_info = canonicalize(&with_namespace_decl(&document, &signed_info))?;

    let signature_value = xpath
        .first_within(&signature, "./ds:SignatureValue")?
        .ok_or(TrustError::MissingSignatureNode)?;
    let signature_bytes = decode_xml_base64(&signature_value.get_content())
        .map_err(|e| TrustError::MalformedXml(format!("SignatureValue is not base64: {e}")))?;

    // the embedded certificate must be read before the enveloped transform
    // detaches the signature below
    let embedded_certificate = xpath
        .first_within(&signature, "./ds:KeyInfo/ds:X509Data/ds:X509Certificate")?
        .map(|node| node.get_content());

    validate_reference(&document, &xpath, &signature)?;

    let verifying_key = match certificate {
        Some(certificate) => SecurityKey::from_certificate_pem(certificate, algorithm)?,
        None => {
            let embedded = embedded_certificate.ok_or_else(|| {
                TrustError::MissingKey("signature embeds no X509Certificate".into())
            })?;
            let embedded_pem = format_cert(&embedded, true);
            let expected = fingerprint.ok_or_else(|| {
                TrustError::MissingKey("neither certificate nor fingerprint supplied".into())
            })?;
            let actual = calculate_fingerprint(&embedded_pem, fingerprint_algorithm)
                .ok_or_else(|| {
                    TrustError::MissingKey("embedded certificate yields no fingerprint".into())
                })?;
            if format_fingerprint(expected) != actual {
                tracing::warn!("embedded certificate does not match the configured fingerprint");
                return Ok(false);
            }
            SecurityKey::from_certificate_pem(&embedded_pem, algorithm)?
        }
    };

    let message_digest = algorithm
        .message_digest()
        .ok_or_else(|| TrustError::MissingKey(format!("{algorithm} has no digest")))?;
    let public_key = verifying_key.public_key()?;
    let mut verifier = Verifier::new(message_digest, &public_key)?;
    verifier.update(canonical_signed_info.as_bytes())?;
    let valid = verifier.verify(&signature_bytes)?;

    tracing::debug!(valid, algorithm = %algorithm, "verified document signature");
    Ok(valid)
}

/// Checks the reference digest: locates the referenced element, applies the
/// enveloped-signature transform (the signature node is detached) and
/// exclusive C14N, digests, and compares against `DigestValue`.
fn validate_reference(
    document: &Document,
    xpath: &SamlXPath,
    signature: &Node,
) -> TrustResult<()> {
    let reference = xpath
        .first_within(signature, "./ds:SignedInfo/ds:Reference")?
        .ok_or_else(|| TrustError::ReferenceValidation("signature carries no Reference".into()))?;

    let digest_uri = xpath
        .first_within(&reference, "./ds:DigestMethod")?
        .and_then(|method| method.get_attribute("Algorithm"))
        .ok_or_else(|| TrustError::ReferenceValidation("reference declares no DigestMethod".into()))?;
    let message_digest = digest_from_uri(&digest_uri).ok_or_else(|| {
        TrustError::ReferenceValidation(format!("unsupported digest algorithm {digest_uri}"))
    })?;

    let expected: String = xpath
        .first_within(&reference, "./ds:DigestValue")?
        .ok_or_else(|| TrustError::ReferenceValidation("reference carries no DigestValue".into()))?
        .get_content()
        .split_whitespace()
        .collect();

    let uri = reference.get_attribute("URI").unwrap_or_default();
    let target = if uri.is_empty() {
        document
            .get_root_element()
            .ok_or_else(|| TrustError::ReferenceValidation("document has no root element".into()))?
    } else {
        let id = uri.strip_prefix('#').ok_or_else(|| {
            TrustError::ReferenceValidation(format!("unsupported Reference URI {uri}"))
        })?;
        if id.contains(['\'', '"', ']']) {
            return Err(TrustError::ReferenceValidation(format!(
                "malformed reference id {id}"
            )));
        }
        xpath
            .first(&format!("//*[@ID='{id}']"))?
            .ok_or_else(|| TrustError::ReferenceValidation(format!("no element with ID {id}")))?
    };

    let mut detached = signature.clone();
    detached.unlink();

    let canonical = canonicalize(&document.node_to_string(&target))?;
    let digest = openssl::hash::hash(message_digest, canonical.as_bytes())?;
    if STANDARD.encode(digest) != expected {
        return Err(TrustError::ReferenceValidation("digest mismatch".into()));
    }
    Ok(())
}

/// Where the signature fragment goes inside the serialized root element.
///
/// The four protocol message types carry their signature immediately after
/// their single `saml:Issuer` child; more than one Issuer makes the
/// insertion point ambiguous and is an error. Everything else gets the
/// signature in first-child position.
fn signature_insertion_offset(
    document: &Document,
    root: &Node,
    serialized: &str,
) -> TrustResult<usize> {
    let content_start = end_of_start_tag(serialized)?;

    if ProtocolMessage::from_local_name(&root.get_name()).is_none() {
        return Ok(content_start);
    }

    let xpath = SamlXPath::new(document)?;
    let issuers = xpath.query_within(root, "./saml:Issuer")?;
    match issuers.len() {
        0 => Ok(content_start),
        1 => {
            let close = format!("</{}>", qualified_name(&issuers[0]));
            serialized[content_start..]
                .find(&close)
                .map(|position| content_start + position + close.len())
                .ok_or_else(|| TrustError::MalformedXml("Issuer not found in serialization".into()))
        }
        count => Err(TrustError::AmbiguousInsertionPoint(count)),
    }
}

/// Index just past the `>` that closes the first start tag, skipping over
/// quoted attribute values.
fn end_of_start_tag(serialized: &str) -> TrustResult<usize> {
    let bytes = serialized.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &byte) in bytes.iter().enumerate() {
        match (quote, byte) {
            (None, b'"') | (None, b'\'') => quote = Some(byte),
            (Some(q), b) if b == q => quote = None,
            (None, b'>') => return Ok(i + 1),
            _ => {}
        }
    }
    Err(TrustError::MalformedXml("unterminated start tag".into()))
}

fn splice(serialized: &str, insert_at: usize, signature_xml: &str, root_qname: &str) -> String {
    if serialized[..insert_at].ends_with("/>") {
        // self-closing root has to be expanded to hold the signature
        let open = &serialized[..insert_at - 2];
        format!(
            "{open}>{signature_xml}</{root_qname}>{}",
            &serialized[insert_at..]
        )
    } else {
        format!(
            "{}{signature_xml}{}",
            &serialized[..insert_at],
            &serialized[insert_at..]
        )
    }
}

fn qualified_name(node: &Node) -> String {
    match node.get_namespace() {
        Some(namespace) if !namespace.get_prefix().is_empty() => {
            format!("{}:{}", namespace.get_prefix(), node.get_name())
        }
        _ => node.get_name(),
    }
}

/// Serializes a node, injecting its namespace declaration into the start
/// tag when the declaration lives on an ancestor.
fn with_namespace_decl(document: &Document, node: &Node) -> String {
    let serialized = document.node_to_string(node);
    let Some(namespace) = node.get_namespace() else {
        return serialized;
    };
    let prefix = namespace.get_prefix();
    if prefix.is_empty() {
        return serialized;
    }
    let declaration = format!("xmlns:{prefix}=");
    let tag_end = end_of_start_tag(&serialized).unwrap_or(serialized.len());
    if serialized[..tag_end].contains(&declaration) {
        return serialized;
    }
    let name_end = serialized[1..]
        .find([' ', '\t', '\n', '>', '/'])
        .map(|i| i + 1)
        .unwrap_or(serialized.len());
    format!(
        "{} xmlns:{}=\"{}\"{}",
        &serialized[..name_end],
        prefix,
        namespace.get_href(),
        &serialized[name_end..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::load_xml;

    const TEST_KEY_PEM: &str = include_str!("../../tests/fixtures/sp_key.pem");
    const TEST_CERT_PEM: &str = include_str!("../../tests/fixtures/sp_cert.pem");

    const RESPONSE: &str = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp1"><saml:Issuer>https://idp.example.com</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status></samlp:Response>"#;

    #[test]
    fn test_signature_lands_after_issuer_for_protocol_messages() {
        let signed =
            sign_document(RESPONSE.into(), TEST_KEY_PEM, TEST_CERT_PEM, CryptoAlgorithm::RsaSha256)
                .unwrap();
        assert!(signed.contains("</saml:Issuer><ds:Signature"));
        assert!(signed.contains("<ds:X509Certificate>"));
        assert!(signed.contains(r##"<ds:Reference URI="#_resp1""##));
    }

    #[test]
    fn test_signature_is_first_child_for_other_roots() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://sp.example.com"><md:SPSSODescriptor/></md:EntityDescriptor>"#;
        let signed =
            sign_document(xml.into(), TEST_KEY_PEM, TEST_CERT_PEM, CryptoAlgorithm::RsaSha256)
                .unwrap();
        let signature_at = signed.find("<ds:Signature").unwrap();
        let descriptor_at = signed.find("<md:SPSSODescriptor").unwrap();
        assert!(signature_at < descriptor_at);
    }

    #[test]
    fn test_missing_id_attribute_is_generated() {
        let xml = r#"<Data><Inner>x</Inner></Data>"#;
        let signed =
            sign_document(xml.into(), TEST_KEY_PEM, TEST_CERT_PEM, CryptoAlgorithm::RsaSha256)
                .unwrap();
        assert!(signed.contains("<Data ID=\"_"));
        assert!(signed.contains(r##"<ds:Reference URI="#_"##));
    }

    #[test]
    fn test_self_closing_root_is_expanded() {
        let signed = sign_document(
            r#"<Data ID="_d1"/>"#.into(),
            TEST_KEY_PEM,
            TEST_CERT_PEM,
            CryptoAlgorithm::RsaSha256,
        )
        .unwrap();
        assert!(signed.contains("<ds:Signature"));
        assert!(signed.trim_end().ends_with("</Data>"));
    }

    #[test]
    fn test_two_issuer_children_are_ambiguous() {
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r"><saml:Issuer>a</saml:Issuer><saml:Issuer>b</saml:Issuer></samlp:Response>"#;
        assert!(matches!(
            sign_document(xml.into(), TEST_KEY_PEM, TEST_CERT_PEM, CryptoAlgorithm::RsaSha256),
            Err(TrustError::AmbiguousInsertionPoint(2))
        ));
    }

    #[test]
    fn test_non_signature_algorithm_is_rejected() {
        assert!(sign_document(
            RESPONSE.into(),
            TEST_KEY_PEM,
            TEST_CERT_PEM,
            CryptoAlgorithm::Aes128Cbc
        )
        .is_err());
    }

    #[test]
    fn test_verify_without_signature_node() {
        assert!(matches!(
            verify_signature(RESPONSE.into(), Some(TEST_CERT_PEM), None, FingerprintAlgorithm::Sha1),
            Err(TrustError::MissingSignatureNode)
        ));
    }

    #[test]
    fn test_end_of_start_tag_skips_quoted_gt() {
        assert_eq!(end_of_start_tag(r#"<a b="x>y">z</a>"#).unwrap(), 11);
        assert_eq!(end_of_start_tag("<a>").unwrap(), 3);
        assert!(end_of_start_tag("<a b=\"x").is_err());
    }

    #[test]
    fn test_qualified_name_uses_prefix() {
        let document =
            load_xml(r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"/>"#)
                .unwrap();
        let root = document.get_root_element().unwrap();
        assert_eq!(qualified_name(&root), "samlp:Response");

        let document = load_xml("<Plain/>").unwrap();
        let root = document.get_root_element().unwrap();
        assert_eq!(qualified_name(&root), "Plain");
    }

    #[test]
    fn test_protocol_message_lookup() {
        for name in ["AuthnRequest", "Response", "LogoutRequest", "LogoutResponse"] {
            assert!(ProtocolMessage::from_local_name(name).is_some());
        }
        assert!(ProtocolMessage::from_local_name("Assertion").is_none());
        assert!(ProtocolMessage::from_local_name("EntityDescriptor").is_none());
    }
}
