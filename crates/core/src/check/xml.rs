//! Small XML helpers shared by the control client.

use std::collections::HashSet;
use std::time::Duration;

use roxmltree::{Document, Node};

use super::CheckError;

const NO_ERROR_MESSAGE: &str = "No error message provided";

/// Extract the message from a daemon error envelope.
///
/// The message is the root element's leading text. An empty root still
/// counts as a well-formed envelope.
pub fn parse_error_envelope(body: &str) -> Result<String, CheckError> {
    let doc = Document::parse(body)?;
    let message = doc.root_element().text().map(str::trim).unwrap_or("");

    if message.is_empty() {
        Ok(NO_ERROR_MESSAGE.to_string())
    } else {
        Ok(message.to_string())
    }
}

/// Every `uuid` attribute value in the document.
pub fn collect_uuids(body: &str) -> Result<HashSet<String>, CheckError> {
    let doc = Document::parse(body)?;
    Ok(doc
        .descendants()
        .filter(Node::is_element)
        .filter_map(|node| node.attribute("uuid"))
        .map(str::to_string)
        .collect())
}

/// Timeout declared in a check's `attributes/timeout`, in milliseconds.
///
/// Returns `Ok(None)` when the element is absent or not a number; fails only
/// when the document itself cannot be parsed.
pub fn declared_timeout(check_xml: &str) -> Result<Option<Duration>, CheckError> {
    let doc = Document::parse(check_xml)?;
    let timeout = child_path(doc.root_element(), &["attributes", "timeout"])
        .and_then(|node| node.text())
        .and_then(|text| text.trim().parse::<u64>().ok())
        .map(Duration::from_millis);
    Ok(timeout)
}

/// Follow a path of child element names from `node`.
pub(crate) fn child_path<'a, 'input>(
    node: Node<'a, 'input>,
    path: &[&str],
) -> Option<Node<'a, 'input>> {
    path.iter().try_fold(node, |current, name| child(current, name))
}

pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.has_tag_name(name))
}

/// First match for `path` anchored at any element in the document.
pub(crate) fn find_anywhere<'a, 'input>(
    doc: &'a Document<'input>,
    path: &[&str],
) -> Option<Node<'a, 'input>> {
    let (first, rest) = path.split_first()?;
    doc.descendants()
        .filter(|n| n.is_element() && n.has_tag_name(*first))
        .find_map(|n| child_path(n, rest))
}

pub(crate) fn element_text(node: Node<'_, '_>) -> String {
    node.text().map(str::trim).unwrap_or("").to_string()
}

/// Escape text for use in element content.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
