//! XSD validation for SAML documents.

use libxml::schemas::{SchemaParserContext, SchemaValidationContext};
use libxml::tree::Document;

use crate::error::{TrustError, TrustResult};
use crate::xml::XmlSource;

/// Validates a document (or raw XML text) against the supplied XSD.
///
/// Validation is all-or-nothing: on failure every collected parser
/// diagnostic is returned in [`TrustError::SchemaViolation`]. With `debug`
/// set, each diagnostic is additionally logged for operator visibility;
/// the outcome is unchanged.
pub fn validate_against_schema(
    xml: XmlSource<'_>,
    schema_xsd: &str,
    debug: bool,
) -> TrustResult<Document> {
    let document = xml.to_private_document()?;

    let mut parser = SchemaParserContext::from_buffer(schema_xsd);
    let mut schema = SchemaValidationContext::from_parser(&mut parser)
        .map_err(|errors| TrustError::InvalidSchema(join_messages(&errors)))?;

    if let Err(errors) = schema.validate_document(&document) {
        let messages: Vec<String> = errors
            .iter()
            .map(|error| error.message().trim().to_string())
            .collect();
        if debug {
            for message in &messages {
                tracing::warn!(%message, "schema validation error");
            }
        }
        return Err(TrustError::SchemaViolation(messages));
    }

    Ok(document)
}

fn join_messages(errors: &[libxml::error::StructuredError]) -> String {
    errors
        .iter()
        .map(|error| error.message().trim().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
