//! Copy-as-rich-text payload.

use serde::Serialize;

use crate::security::{HtmlSanitizer, sanitize_text};

/// The representations handed to the OS clipboard together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipboardPayload {
    pub html: String,
    pub text: String,
}

impl ClipboardPayload {
    /// Sanitize preview HTML. The plain-text form comes from `text` when
    /// the preview supplies one, otherwise from the sanitized tree.
    pub fn build(sanitizer: &HtmlSanitizer, html: &str, text: Option<&str>) -> Self {
        let text = match text {
            Some(t) => sanitize_text(t),
            None => sanitizer.plain_text(html),
        };
        Self {
            html: sanitizer.sanitize_html(html),
            text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_representations_are_sanitized() {
        let payload = ClipboardPayload::build(
            &HtmlSanitizer::default(),
            "<p onclick=\"x()\">Hello <a href=\"javascript:alert(1)\">link</a></p>",
            Some("Hello\u{0} link\n"),
        );
        assert_eq!(
            payload.html,
            "<p>Hello <a rel=\"noopener noreferrer\">link</a></p>"
        );
        assert_eq!(payload.text, "Hello link\n");
    }

    #[test]
    fn text_falls_back_to_sanitized_tree() {
        let payload = ClipboardPayload::build(
            &HtmlSanitizer::default(),
            "<h2>Heading</h2><script>steal()</script><p>para</p>",
            None,
        );
        assert_eq!(payload.text, "Heading\npara");
        assert!(!payload.is_empty());
    }

    #[test]
    fn all_dangerous_input_is_empty() {
        let payload =
            ClipboardPayload::build(&HtmlSanitizer::default(), "<script>x()</script>", None);
        assert!(payload.is_empty());
    }
}
