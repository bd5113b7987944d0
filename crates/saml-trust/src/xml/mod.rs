//! Hardened XML loading, namespace-aware querying and schema validation.

pub mod loader;
pub mod query;
pub mod schema;
pub mod status;

pub use loader::load_xml;
pub use query::SamlXPath;
pub use schema::validate_against_schema;
pub use status::{response_status, ResponseStatus};

use libxml::tree::Document;

use crate::error::TrustResult;

/// Raw XML text or an already parsed document.
///
/// Operations that rewrite the tree (signing, verification) never touch a
/// caller-supplied document; they work on a private re-parse.
pub enum XmlSource<'a> {
    Text(&'a str),
    Document(&'a Document),
}

impl<'a> From<&'a str> for XmlSource<'a> {
    fn from(text: &'a str) -> Self {
        XmlSource::Text(text)
    }
}

impl<'a> From<&'a Document> for XmlSource<'a> {
    fn from(document: &'a Document) -> Self {
        XmlSource::Document(document)
    }
}

impl XmlSource<'_> {
    /// Parses into a document owned by the caller of this method. Document
    /// inputs are re-serialized through the secure loader so the original
    /// tree is never mutated.
    pub(crate) fn to_private_document(&self) -> TrustResult<Document> {
        match self {
            XmlSource::Text(text) => load_xml(text),
            XmlSource::Document(document) => load_xml(&document.to_string()),
        }
    }
}

/// XML-escapes text and attribute values.
pub(crate) fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
