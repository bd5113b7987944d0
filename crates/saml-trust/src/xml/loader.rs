//! Hardened XML parsing for untrusted SAML payloads.

use libxml::parser::{Parser, ParserOptions};
use libxml::tree::Document;

use crate::error::{TrustError, TrustResult};

/// Parses untrusted XML, refusing documents that carry entity declarations.
///
/// The literal `<!ENTITY` check runs before the parser sees the input and is
/// independent of parser configuration. The parse itself runs with network
/// access disabled and without entity substitution; the options are scoped
/// to this call, so concurrent parses never observe each other's settings.
pub fn load_xml(xml: &str) -> TrustResult<Document> {
    if xml.contains("<!ENTITY") {
        return Err(TrustError::EntityDeclarationDetected);
    }

    let parser = Parser::default();
    let options = ParserOptions {
        no_net: true,
        no_error: true,
        no_warning: true,
        ..ParserOptions::default()
    };
    parser
        .parse_string_with_options(xml, options)
        .map_err(|e| TrustError::MalformedXml(format!("{e:?}")))
}
