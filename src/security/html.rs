//! Allowlist HTML sanitizer for clipboard export.
//!
//! The live preview's serialized HTML is parsed as a body fragment with
//! `html5ever`, then a *fresh* tree is built bottom-up from the parsed DOM:
//!
//! ```text
//!   input ──► html5ever RcDom ──► build() ──► CleanTree arena ──► serialize()
//!                                 │
//!                                 ├─ dangerous element  → dropped with subtree
//!                                 ├─ comment / doctype  → dropped
//!                                 ├─ unknown element    → text node (flattened)
//!                                 └─ allowed element    → filtered attributes
//! ```
//!
//! The parsed DOM is never mutated. Any input the parser cannot turn into
//! a tree within the configured limits sanitizes to the empty string.

use html5ever::tendril::TendrilSink;
use html5ever::{LocalName, Namespace, ParseOpts, QualName, parse_fragment};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::error::GuardError;
use crate::config::SanitizerConfig;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements whose whole subtree is discarded, content included.
pub const DANGEROUS_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "frame", "frameset", "object", "embed", "applet", "form", "input",
    "button", "textarea", "select", "meta", "link", "base", "noscript", "template", "slot",
    "portal",
];

/// Elements kept as markup.
const ALLOWED_ELEMENTS: &[&str] = &[
    "a", "abbr", "article", "aside", "b", "blockquote", "br", "caption", "code", "col",
    "colgroup", "dd", "del", "details", "div", "dl", "dt", "em", "figcaption", "figure", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "i", "img", "ins", "kbd", "li", "mark",
    "ol", "p", "pre", "q", "s", "samp", "section", "small", "span", "strong", "sub", "summary",
    "sup", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "u", "ul", "var",
];

/// Elements that end a line in the plain-text form.
const BLOCK_ELEMENTS: &[&str] = &[
    "article", "aside", "blockquote", "caption", "dd", "details", "div", "dl", "dt",
    "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li",
    "ol", "p", "pre", "section", "summary", "table", "tr", "ul",
];

/// Attribute allowlist. `*` applies to every allowed element.
const ALLOWED_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("*", &["class", "id", "title", "lang", "dir"]),
    ("a", &["href", "name", "target"]),
    ("img", &["src", "alt", "width", "height"]),
    ("ol", &["start", "reversed", "type"]),
    ("li", &["value"]),
    ("td", &["colspan", "rowspan", "align"]),
    ("th", &["colspan", "rowspan", "align", "scope"]),
    ("col", &["span"]),
    ("colgroup", &["span"]),
    ("details", &["open"]),
];

/// Attributes whose value is a URL and gets a protocol check.
const URL_ATTRIBUTES: &[&str] = &["href", "src"];

const BLOCKED_PROTOCOLS: &[&str] = &["javascript", "vbscript", "data", "file", "blob", "about"];
const ALLOWED_PROTOCOLS: &[&str] = &["http", "https", "mailto"];

const FORCED_REL: &str = "noopener noreferrer";

/// Elements serialized without an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Immutable sanitizer configuration.
#[derive(Debug, Clone)]
pub struct SanitizationPolicy {
    pub allowed_elements: HashSet<String>,
    /// Element name (or `*`) to allowed attribute names.
    pub allowed_attributes: HashMap<String, HashSet<String>>,
    pub dangerous_elements: HashSet<String>,
    pub blocked_protocols: HashSet<String>,
    pub allowed_protocols: HashSet<String>,
    /// Inputs larger than this are refused (0 = unlimited).
    pub max_input_bytes: usize,
    /// Trees deeper than this are refused.
    pub max_depth: usize,
}

impl Default for SanitizationPolicy {
    fn default() -> Self {
        Self::from_config(&SanitizerConfig::default())
    }
}

impl SanitizationPolicy {
    pub fn from_config(config: &SanitizerConfig) -> Self {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<HashSet<_>>();
        Self {
            allowed_elements: set(ALLOWED_ELEMENTS),
            allowed_attributes: ALLOWED_ATTRIBUTES
                .iter()
                .map(|(tag, attrs)| (tag.to_string(), set(attrs)))
                .collect(),
            dangerous_elements: set(DANGEROUS_ELEMENTS),
            blocked_protocols: set(BLOCKED_PROTOCOLS),
            allowed_protocols: set(ALLOWED_PROTOCOLS),
            max_input_bytes: config.max_input_bytes,
            max_depth: config.max_depth,
        }
    }

    fn attribute_allowed(&self, element: &str, attr: &str) -> bool {
        let listed = |key: &str| {
            self.allowed_attributes
                .get(key)
                .is_some_and(|names| names.contains(attr))
        };
        listed("*") || listed(element)
    }

    /// URL protocol check for `href`/`src` values. Relative references and
    /// fragments carry no scheme and pass.
    pub fn url_allowed(&self, value: &str) -> bool {
        match url_scheme(value) {
            None => true,
            Some(scheme) if self.blocked_protocols.contains(&scheme) => false,
            Some(scheme) => self.allowed_protocols.contains(&scheme),
        }
    }
}

/// Lowercased scheme of `value`, if it has one.
///
/// Browsers ignore ASCII whitespace and control characters inside a URL
/// scheme (`java\tscript:`), so those are removed before looking for it.
fn url_scheme(value: &str) -> Option<String> {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect();
    let colon = compact.find(':')?;
    let candidate = &compact[..colon];
    // A '/', '?' or '#' before the colon makes this a relative reference.
    if candidate.is_empty() || candidate.contains(['/', '?', '#']) {
        return None;
    }
    Some(candidate.to_ascii_lowercase())
}

// ── Output tree ─────────────────────────────────────────────────────

#[derive(Debug)]
enum CleanNode {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<usize>,
    },
    Text(String),
}

/// Arena of sanitized nodes; children refer to arena indices.
#[derive(Debug, Default)]
struct CleanTree {
    nodes: Vec<CleanNode>,
    roots: Vec<usize>,
}

impl CleanTree {
    fn push(&mut self, node: CleanNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn text_of(&self, ids: &[usize], out: &mut String) {
        for &id in ids {
            match &self.nodes[id] {
                CleanNode::Text(t) => out.push_str(t),
                CleanNode::Element { children, .. } => self.text_of(children, out),
            }
        }
    }

    /// Like `text_of`, but block elements end their line and `br` breaks one.
    fn lines_of(&self, ids: &[usize], out: &mut String) {
        for &id in ids {
            match &self.nodes[id] {
                CleanNode::Text(t) => out.push_str(t),
                CleanNode::Element { name, .. } if name == "br" => out.push('\n'),
                CleanNode::Element { name, children, .. } => {
                    let block = BLOCK_ELEMENTS.contains(&name.as_str());
                    if block && !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    self.lines_of(children, out);
                    if block && !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
        }
    }
}

/// Allowlist sanitizer. Cheap to share: holds only the immutable policy.
#[derive(Debug, Clone, Default)]
pub struct HtmlSanitizer {
    policy: SanitizationPolicy,
}

impl HtmlSanitizer {
    pub fn new(policy: SanitizationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SanitizationPolicy {
        &self.policy
    }

    /// Sanitize an HTML fragment. Returns `""` if the input cannot be
    /// processed.
    ///
    /// ```
    /// use mdguard::security::HtmlSanitizer;
    ///
    /// let clean = HtmlSanitizer::default()
    ///     .sanitize_html(r#"<p onclick="x()">Hi <script>evil()</script><b>there</b></p>"#);
    /// assert_eq!(clean, "<p>Hi <b>there</b></p>");
    /// ```
    pub fn sanitize_html(&self, html: &str) -> String {
        match self.clean_tree(html) {
            Ok(tree) => serialize(&tree),
            Err(e) => {
                warn!(error = %e, "HTML sanitization failed closed");
                String::new()
            }
        }
    }

    /// Text content of the sanitized fragment, passed through
    /// [`sanitize_text`].
    pub fn plain_text(&self, html: &str) -> String {
        match self.clean_tree(html) {
            Ok(tree) => {
                let mut text = String::new();
                tree.lines_of(&tree.roots, &mut text);
                sanitize_text(text.trim_end_matches('\n'))
            }
            Err(e) => {
                warn!(error = %e, "HTML text extraction failed closed");
                String::new()
            }
        }
    }

    fn clean_tree(&self, html: &str) -> Result<CleanTree, GuardError> {
        if self.policy.max_input_bytes > 0 && html.len() > self.policy.max_input_bytes {
            return Err(GuardError::Parse(format!(
                "input is {} bytes, limit is {}",
                html.len(),
                self.policy.max_input_bytes
            )));
        }

        let dom = parse(html);
        let mut tree = CleanTree::default();

        // Fragment parsing yields Document > html > (fragment nodes).
        let document_children = dom.document.children.borrow();
        for top in document_children.iter() {
            let children = top.children.borrow();
            for child in children.iter() {
                let built = self.build(child, 1, &mut tree)?;
                tree.roots.extend(built);
            }
        }
        Ok(tree)
    }

    /// Build the sanitized counterpart of `handle` into `tree` and return
    /// the ids of the nodes it produced (zero or one).
    fn build(
        &self,
        handle: &Handle,
        depth: usize,
        tree: &mut CleanTree,
    ) -> Result<Option<usize>, GuardError> {
        if depth > self.policy.max_depth {
            return Err(GuardError::Parse(format!(
                "nesting depth exceeds {}",
                self.policy.max_depth
            )));
        }

        match &handle.data {
            NodeData::Text { contents } => {
                Ok(Some(tree.push(CleanNode::Text(contents.borrow().to_string()))))
            }
            NodeData::Element { name, attrs, .. } => {
                let local: &str = &name.local;
                if self.policy.dangerous_elements.contains(local) {
                    debug!(element = local, "Dropped dangerous element");
                    return Ok(None);
                }

                let mark = tree.nodes.len();
                let mut children = Vec::new();
                for child in handle.children.borrow().iter() {
                    if let Some(id) = self.build(child, depth + 1, tree)? {
                        children.push(id);
                    }
                }

                let is_html = &*name.ns == HTML_NAMESPACE;
                if !is_html || !self.policy.allowed_elements.contains(local) {
                    // Keep the readable content, drop the markup.
                    let mut text = String::new();
                    tree.text_of(&children, &mut text);
                    tree.nodes.truncate(mark);
                    return Ok(Some(tree.push(CleanNode::Text(text))));
                }

                let attrs = self.filter_attributes(local, &attrs.borrow());
                Ok(Some(tree.push(CleanNode::Element {
                    name: local.to_string(),
                    attrs,
                    children,
                })))
            }
            // Comments, doctypes, processing instructions.
            _ => Ok(None),
        }
    }

    fn filter_attributes(
        &self,
        element: &str,
        attrs: &[html5ever::Attribute],
    ) -> Vec<(String, String)> {
        let mut kept = Vec::new();
        for attr in attrs {
            let name = match &attr.name.prefix {
                Some(prefix) => format!("{}:{}", prefix, attr.name.local),
                None => attr.name.local.to_string(),
            };
            let lower = name.to_ascii_lowercase();

            if lower.starts_with("on") || lower == "style" || lower.starts_with("data-") {
                continue;
            }
            if element == "a" && lower == "rel" {
                continue;
            }
            if !self.policy.attribute_allowed(element, &lower) {
                continue;
            }
            let value = attr.value.to_string();
            if URL_ATTRIBUTES.contains(&lower.as_str()) && !self.policy.url_allowed(&value) {
                debug!(element, attribute = %lower, "Dropped attribute with blocked protocol");
                continue;
            }
            kept.push((lower, value));
        }

        if element == "a" {
            kept.push(("rel".to_string(), FORCED_REL.to_string()));
        }
        kept
    }
}

fn parse(html: &str) -> RcDom {
    let context = QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from("body"),
    );
    parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new()).one(html)
}

// ── Serialization ───────────────────────────────────────────────────

fn serialize(tree: &CleanTree) -> String {
    let mut out = String::new();
    for &id in &tree.roots {
        write_node(tree, id, &mut out);
    }
    out
}

fn write_node(tree: &CleanTree, id: usize, out: &mut String) {
    match &tree.nodes[id] {
        CleanNode::Text(text) => escape_text(text, out),
        CleanNode::Element {
            name,
            attrs,
            children,
        } => {
            out.push('<');
            out.push_str(name);
            for (key, value) in attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_attribute(value, out);
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&name.as_str()) {
                return;
            }

            // The parser drops one newline right after <pre>; write it back.
            if name == "pre"
                && let Some(&first) = children.first()
                && let CleanNode::Text(t) = &tree.nodes[first]
                && t.starts_with('\n')
            {
                out.push('\n');
            }

            for &child in children {
                write_node(tree, child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{A0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{A0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// Strip NUL and C0 control characters except `\t`, `\n`, `\r`.
///
/// ```
/// use mdguard::security::sanitize_text;
///
/// assert_eq!(sanitize_text("a\u{0}b\u{7}c\td\r\n"), "abc\td\r\n");
/// ```
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            !matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}')
        })
        .collect()
}
