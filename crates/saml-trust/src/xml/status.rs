//! Status extraction from SAML Response documents.

use libxml::tree::Document;

use crate::error::{TrustError, TrustResult};
use crate::xml::SamlXPath;

/// The status of a Response: the top-level status code plus either the
/// status message or, when absent, the nested sub-status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseStatus {
    pub code: String,
    pub message: Option<String>,
}

/// Reads `samlp:Status` from a Response document.
pub fn response_status(document: &Document) -> TrustResult<ResponseStatus> {
    let xpath = SamlXPath::new(document)?;

    let status = xpath
        .first("/samlp:Response/samlp:Status")?
        .ok_or_else(|| TrustError::MalformedXml("missing Status on Response".into()))?;

    let code = xpath
        .first_within(&status, "./samlp:StatusCode")?
        .and_then(|node| node.get_attribute("Value"))
        .ok_or_else(|| TrustError::MalformedXml("missing StatusCode on Response".into()))?;

    let message = match xpath.first_within(&status, "./samlp:StatusMessage")? {
        Some(node) => Some(node.get_content()),
        None => xpath
            .first_within(&status, "./samlp:StatusCode/samlp:StatusCode")?
            .and_then(|node| node.get_attribute("Value")),
    };

    Ok(ResponseStatus { code, message })
}
