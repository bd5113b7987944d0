//! Namespace-aware XPath queries bound to the SAML namespaces.

use std::cell::RefCell;

use libxml::tree::{Document, Node};
use libxml::xpath::Context;

use crate::constants::{NS_DS, NS_SAML, NS_SAMLP, NS_XENC};
use crate::error::{TrustError, TrustResult};

/// XPath helper with the four fixed SAML prefixes registered: `samlp`
/// (protocol), `saml` (assertion), `ds` (xmldsig) and `xenc` (xmlenc).
///
/// Queries are side-effect-free and return a fresh node sequence per call.
pub struct SamlXPath {
    context: RefCell<Context>,
}

impl SamlXPath {
    pub fn new(document: &Document) -> TrustResult<Self> {
        let mut context = Context::new(document)
            .map_err(|e| TrustError::XPath(format!("failed to create context: {e:?}")))?;
        for (prefix, href) in [
            ("samlp", NS_SAMLP),
            ("saml", NS_SAML),
            ("ds", NS_DS),
            ("xenc", NS_XENC),
        ] {
            context
                .register_namespace(prefix, href)
                .map_err(|e| TrustError::XPath(format!("failed to register {prefix}: {e:?}")))?;
        }
        Ok(Self {
            context: RefCell::new(context),
        })
    }

    /// Evaluates an expression against the document root.
    pub fn query(&self, expression: &str) -> TrustResult<Vec<Node>> {
        self.nodes(expression, None)
    }

    /// Evaluates an expression against the given subtree.
    pub fn query_within(&self, context_node: &Node, expression: &str) -> TrustResult<Vec<Node>> {
        self.nodes(expression, Some(context_node))
    }

    /// First match against the document root, if any.
    pub fn first(&self, expression: &str) -> TrustResult<Option<Node>> {
        Ok(self.query(expression)?.into_iter().next())
    }

    /// First match within the given subtree, if any.
    pub fn first_within(
        &self,
        context_node: &Node,
        expression: &str,
    ) -> TrustResult<Option<Node>> {
        Ok(self.query_within(context_node, expression)?.into_iter().next())
    }

    fn nodes(&self, expression: &str, context_node: Option<&Node>) -> TrustResult<Vec<Node>> {
        self.context
            .borrow_mut()
            .findnodes(expression, context_node)
            .map_err(|e| TrustError::XPath(format!("{expression}: {e:?}")))
    }
}
