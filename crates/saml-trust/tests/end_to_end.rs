//! End-to-end scenarios for the trust core.
//!
//! Run with: cargo test -p saml-trust --test end_to_end
//!
//! Covers the full signing and encryption flows against a fixed 2048-bit
//! test key pair: sign -> verify (certificate and fingerprint trust),
//! tamper detection, encrypt -> decrypt of identifiers, and the hardened
//! XML loading path.

use saml_trust::{
    calculate_fingerprint, decrypt_element, encrypt_name_id, format_cert, load_xml,
    sign_document, verify_signature, CryptoAlgorithm, FingerprintAlgorithm, SamlXPath,
    SecurityKey, TrustError,
};

const SP_KEY_PEM: &str = include_str!("fixtures/sp_key.pem");
const SP_CERT_PEM: &str = include_str!("fixtures/sp_cert.pem");
const OTHER_CERT_PEM: &str = include_str!("fixtures/other_cert.pem");
const OTHER_KEY_PEM: &str = include_str!("fixtures/other_key.pem");

// sha1 of the DER payload of fixtures/sp_cert.pem
const SP_CERT_SHA1: &str = "4a6b592305281bf71769a0131a238a5d45738de6";
const SP_CERT_SHA1_COLONED: &str = "4A:6B:59:23:05:28:1B:F7:17:69:A0:13:1A:23:8A:5D:45:73:8D:E6";

const NAME_ID_FORMAT_PERSISTENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent";

fn minimal_response() -> &'static str {
    r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_response42" Version="2.0" IssueInstant="2024-02-29T12:00:00Z"><saml:Issuer>https://idp.example.com/metadata</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status></samlp:Response>"#
}

#[test]
fn sign_then_verify_with_matching_certificate() {
    let signed = sign_document(
        minimal_response().into(),
        SP_KEY_PEM,
        SP_CERT_PEM,
        CryptoAlgorithm::RsaSha256,
    )
    .unwrap();

    let valid = verify_signature(
        signed.as_str().into(),
        Some(SP_CERT_PEM),
        None,
        FingerprintAlgorithm::Sha1,
    )
    .unwrap();
    assert!(valid);
}

#[test]
fn verify_with_unrelated_certificate_fails() {
    let signed = sign_document(
        minimal_response().into(),
        SP_KEY_PEM,
        SP_CERT_PEM,
        CryptoAlgorithm::RsaSha256,
    )
    .unwrap();

    let valid = verify_signature(
        signed.as_str().into(),
        Some(OTHER_CERT_PEM),
        None,
        FingerprintAlgorithm::Sha1,
    )
    .unwrap();
    assert!(!valid);
}

#[test]
fn verify_with_matching_fingerprint_and_no_certificate() {
    let signed = sign_document(
        minimal_response().into(),
        SP_KEY_PEM,
        SP_CERT_PEM,
        CryptoAlgorithm::RsaSha256,
    )
    .unwrap();

    // bare lowercase form
    let valid = verify_signature(
        signed.as_str().into(),
        None,
        Some(SP_CERT_SHA1),
        FingerprintAlgorithm::Sha1,
    )
    .unwrap();
    assert!(valid);

    // coloned uppercase form normalizes to the same fingerprint
    let valid = verify_signature(
        signed.as_str().into(),
        None,
        Some(SP_CERT_SHA1_COLONED),
        FingerprintAlgorithm::Sha1,
    )
    .unwrap();
    assert!(valid);
}

#[test]
fn verify_with_wrong_fingerprint_returns_false_not_error() {
    let signed = sign_document(
        minimal_response().into(),
        SP_KEY_PEM,
        SP_CERT_PEM,
        CryptoAlgorithm::RsaSha256,
    )
    .unwrap();

    let valid = verify_signature(
        signed.as_str().into(),
        None,
        Some("00112233445566778899aabbccddeeff00112233"),
        FingerprintAlgorithm::Sha1,
    )
    .unwrap();
    assert!(!valid);
}

#[test]
fn verify_without_trust_anchor_is_an_error() {
    let signed = sign_document(
        minimal_response().into(),
        SP_KEY_PEM,
        SP_CERT_PEM,
        CryptoAlgorithm::RsaSha256,
    )
    .unwrap();

    assert!(matches!(
        verify_signature(signed.as_str().into(), None, None, FingerprintAlgorithm::Sha1),
        Err(TrustError::MissingKey(_))
    ));
}

#[test]
fn tampered_content_fails_reference_validation() {
    let signed = sign_document(
        minimal_response().into(),
        SP_KEY_PEM,
        SP_CERT_PEM,
        CryptoAlgorithm::RsaSha256,
    )
    .unwrap();

    let tampered = signed.replace(
        "https://idp.example.com/metadata",
        "https://attacker.example.net/metadata",
    );
    assert!(matches!(
        verify_signature(
            tampered.as_str().into(),
            Some(SP_CERT_PEM),
            None,
            FingerprintAlgorithm::Sha1
        ),
        Err(TrustError::ReferenceValidation(_))
    ));
}

#[test]
fn sha1_signatures_round_trip_too() {
    let signed = sign_document(
        minimal_response().into(),
        SP_KEY_PEM,
        SP_CERT_PEM,
        CryptoAlgorithm::RsaSha1,
    )
    .unwrap();
    assert!(signed.contains("http://www.w3.org/2000/09/xmldsig#rsa-sha1"));

    let valid = verify_signature(
        signed.as_str().into(),
        Some(SP_CERT_PEM),
        None,
        FingerprintAlgorithm::Sha1,
    )
    .unwrap();
    assert!(valid);
}

#[test]
fn verify_accepts_parsed_documents_and_leaves_them_unchanged() {
    let signed = sign_document(
        minimal_response().into(),
        SP_KEY_PEM,
        SP_CERT_PEM,
        CryptoAlgorithm::RsaSha256,
    )
    .unwrap();

    let document = load_xml(&signed).unwrap();
    let before = document.to_string();
    let valid =
        verify_signature((&document).into(), Some(SP_CERT_PEM), None, FingerprintAlgorithm::Sha1)
            .unwrap();
    assert!(valid);
    assert_eq!(document.to_string(), before);
}

#[test]
fn fingerprint_of_fixture_certificate_matches_known_value() {
    assert_eq!(
        calculate_fingerprint(SP_CERT_PEM, FingerprintAlgorithm::Sha1).as_deref(),
        Some(SP_CERT_SHA1)
    );
}

#[test]
fn certificate_formatting_is_canonical_both_ways() {
    let direct = format_cert(SP_CERT_PEM, true);
    let via_bare = format_cert(&format_cert(SP_CERT_PEM, false), true);
    assert_eq!(direct, via_bare);

    let lines: Vec<&str> = direct.lines().collect();
    assert!(lines[1..lines.len() - 1].iter().all(|l| l.len() <= 64));
}

#[test]
fn encrypted_identifier_round_trips() {
    let encrypted = encrypt_name_id(
        "user-8c2f",
        Some("https://sp.example.com/metadata"),
        NAME_ID_FORMAT_PERSISTENT,
        Some(SP_CERT_PEM),
    )
    .unwrap();

    let document = load_xml(&encrypted).unwrap();
    let xpath = SamlXPath::new(&document).unwrap();
    let encrypted_data = xpath.first("//xenc:EncryptedData").unwrap().unwrap();

    let key = SecurityKey::from_private_pem(SP_KEY_PEM, CryptoAlgorithm::Rsa15).unwrap();
    let decrypted = decrypt_element(&document, &encrypted_data, &key).unwrap();

    assert_eq!(decrypted.name(), "NameID");
    assert_eq!(decrypted.content(), "user-8c2f");
    assert_eq!(
        decrypted.attribute("Format").as_deref(),
        Some(NAME_ID_FORMAT_PERSISTENT)
    );
    assert_eq!(
        decrypted.attribute("SPNameQualifier").as_deref(),
        Some("https://sp.example.com/metadata")
    );
}

#[test]
fn decryption_with_mismatched_key_algorithm_fails_closed() {
    let encrypted =
        encrypt_name_id("user-8c2f", None, NAME_ID_FORMAT_PERSISTENT, Some(SP_CERT_PEM)).unwrap();

    let document = load_xml(&encrypted).unwrap();
    let xpath = SamlXPath::new(&document).unwrap();
    let encrypted_data = xpath.first("//xenc:EncryptedData").unwrap().unwrap();

    // message declares rsa-1_5; an OAEP-tagged key must be refused
    let key = SecurityKey::from_private_pem(SP_KEY_PEM, CryptoAlgorithm::RsaOaepMgf1p).unwrap();
    assert!(matches!(
        decrypt_element(&document, &encrypted_data, &key),
        Err(TrustError::AlgorithmMismatch { .. })
    ));
}

#[test]
fn decryption_with_wrong_private_key_does_not_recover_the_identifier() {
    let encrypted =
        encrypt_name_id("user-8c2f", None, NAME_ID_FORMAT_PERSISTENT, Some(SP_CERT_PEM)).unwrap();

    let document = load_xml(&encrypted).unwrap();
    let xpath = SamlXPath::new(&document).unwrap();
    let encrypted_data = xpath.first("//xenc:EncryptedData").unwrap().unwrap();

    let key = SecurityKey::from_private_pem(OTHER_KEY_PEM, CryptoAlgorithm::Rsa15).unwrap();
    if let Ok(decrypted) = decrypt_element(&document, &encrypted_data, &key) {
        assert_ne!(decrypted.content(), "user-8c2f");
    }
}

#[test]
fn entity_declarations_are_rejected_everywhere() {
    let attack = r#"<?xml version="1.0"?>
<!DOCTYPE samlp:Response [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol">&xxe;</samlp:Response>"#;

    assert!(matches!(
        load_xml(attack),
        Err(TrustError::EntityDeclarationDetected)
    ));
    assert!(matches!(
        verify_signature(attack.into(), Some(SP_CERT_PEM), None, FingerprintAlgorithm::Sha1),
        Err(TrustError::EntityDeclarationDetected)
    ));
}
