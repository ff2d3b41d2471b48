//! Byte-exact UTF-8 validation and binary-content detection.
//!
//! Every byte buffer read from disk passes through [`ContentValidator`]
//! before a document model sees it. The acceptor follows the
//! well-formed byte sequence table of Unicode 15 (Table 3-7), so it
//! rejects overlong encodings, encoded UTF-16 surrogates, and code
//! points above U+10FFFF with the same precision as the standard.
//!
//! Validation never panics. Every failure comes back as a
//! [`GuardError`].

use serde::Serialize;
use tracing::debug;

use super::error::GuardError;
use crate::config::ContentConfig;

/// UTF-8 byte order mark some editors prepend.
pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Control characters tolerated in text regardless of ratio.
const ALLOWED_CONTROLS: [char; 3] = ['\n', '\r', '\t'];

/// In-process validation outcome: decoded text or the reason it was refused.
pub type ValidationResult = Result<String, GuardError>;

/// Wire form of a [`ValidationResult`].
///
/// Only constructible from a `ValidationResult`, so `content` is present
/// exactly when `valid` is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl From<ValidationResult> for ValidationReport {
    fn from(result: ValidationResult) -> Self {
        match result {
            Ok(content) => Self {
                valid: true,
                content: Some(content),
                error: None,
            },
            Err(e) => Self {
                valid: false,
                content: None,
                error: Some(e.user_message().to_string()),
            },
        }
    }
}

/// Validates raw bytes as legitimate UTF-8 text.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    /// Reject buffers larger than this many bytes (0 = unlimited).
    max_bytes: u64,
    /// Control-character ratio above which content is treated as binary.
    binary_control_ratio: f64,
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::from_config(&ContentConfig::default())
    }
}

impl ContentValidator {
    pub fn new(max_bytes: u64, binary_control_ratio: f64) -> Self {
        Self {
            max_bytes,
            binary_control_ratio,
        }
    }

    pub fn from_config(config: &ContentConfig) -> Self {
        Self::new(config.max_bytes, config.binary_control_ratio)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validate a buffer and decode it.
    ///
    /// # Examples
    ///
    /// ```
    /// use mdguard::security::ContentValidator;
    ///
    /// let validator = ContentValidator::default();
    /// assert_eq!(validator.validate(b"\xEF\xBB\xBF# Title\n").unwrap(), "# Title\n");
    /// assert!(validator.validate(b"\xC0\xAF").is_err());
    /// assert!(validator.validate(b"abc\0def").is_err());
    /// ```
    pub fn validate(&self, buffer: &[u8]) -> ValidationResult {
        if self.max_bytes > 0 && buffer.len() as u64 > self.max_bytes {
            return Err(GuardError::FileTooLarge {
                size: buffer.len() as u64,
                limit: self.max_bytes,
            });
        }

        let body = buffer.strip_prefix(&UTF8_BOM[..]).unwrap_or(buffer);

        if let Err(offset) = accept_utf8(body) {
            debug!(offset, "Rejected content: invalid UTF-8");
            return Err(GuardError::Encoding { offset });
        }

        // Cannot fail once accept_utf8 has passed.
        let text = String::from_utf8(body.to_vec()).map_err(|e| GuardError::Encoding {
            offset: e.utf8_error().valid_up_to(),
        })?;

        self.check_binary(&text)?;
        Ok(text)
    }

    fn check_binary(&self, text: &str) -> Result<(), GuardError> {
        if let Some(pos) = text.find('\0') {
            debug!(offset = pos, "Rejected content: NUL byte");
            return Err(GuardError::BinaryContent {
                reason: format!("NUL byte at offset {}", pos),
            });
        }

        let ratio = control_ratio(text);
        if ratio > self.binary_control_ratio {
            debug!(
                ratio,
                threshold = self.binary_control_ratio,
                "Rejected content: control character ratio"
            );
            return Err(GuardError::BinaryContent {
                reason: format!(
                    "control character ratio {:.3} exceeds {:.3}",
                    ratio, self.binary_control_ratio
                ),
            });
        }

        Ok(())
    }
}

/// Fraction of characters that are disallowed control characters.
fn control_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut controls = 0usize;
    for c in text.chars() {
        total += 1;
        if is_disallowed_control(c) {
            controls += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    controls as f64 / total as f64
}

fn is_disallowed_control(c: char) -> bool {
    (c <= '\u{1F}' || c == '\u{7F}') && !ALLOWED_CONTROLS.contains(&c)
}

/// Byte-level UTF-8 acceptor.
///
/// Returns `Err(offset)` with the offset of the lead byte of the first
/// ill-formed sequence.
pub fn accept_utf8(bytes: &[u8]) -> Result<(), usize> {
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        let width = match lead {
            0x00..=0x7F => {
                i += 1;
                continue;
            }
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            // 0x80..=0xC1 and 0xF5..=0xFF can never start a sequence.
            _ => return Err(i),
        };

        if i + width > bytes.len() {
            return Err(i);
        }

        let first = bytes[i + 1];
        let first_ok = match lead {
            0xE0 => (0xA0..=0xBF).contains(&first),
            0xED => (0x80..=0x9F).contains(&first),
            0xF0 => (0x90..=0xBF).contains(&first),
            0xF4 => (0x80..=0x8F).contains(&first),
            _ => is_continuation(first),
        };
        if !first_ok {
            return Err(i);
        }

        if !bytes[i + 2..i + width].iter().all(|&b| is_continuation(b)) {
            return Err(i);
        }

        i += width;
    }
    Ok(())
}

#[inline]
fn is_continuation(b: u8) -> bool {
    (0x80..=0xBF).contains(&b)
}
