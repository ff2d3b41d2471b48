//! File-open flow: path policy, bounded read, content validation.
//!
//! Only bytes that pass [`ContentValidator`] ever become a [`Document`].

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::config::Config;
use crate::security::{ContentValidator, GuardError, PathGuard, resolve_within};

/// Validated document text and where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    paths: PathGuard,
    content: ContentValidator,
}

impl DocumentLoader {
    pub fn new(paths: PathGuard, content: ContentValidator) -> Self {
        Self { paths, content }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            PathGuard::from_config(&config.files),
            ContentValidator::from_config(&config.content),
        )
    }

    pub fn path_guard(&self) -> &PathGuard {
        &self.paths
    }

    /// Open `path` as a document.
    pub async fn load(&self, path: &str) -> Result<Document, GuardError> {
        let resolved = self.paths.check(path)?;
        let bytes = self.read_bounded(&resolved).await?;
        let content = self.content.validate(&bytes)?;

        info!(bytes = bytes.len(), "Opened document");
        Ok(Document {
            path: resolved,
            content,
        })
    }

    /// Read at most `max_bytes + 1` so an oversized file is detected
    /// without reading all of it.
    async fn read_bounded(&self, path: &Path) -> Result<Vec<u8>, GuardError> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(GuardError::UnsafePath {
                path: path.display().to_string(),
                reason: "not a regular file".into(),
            });
        }

        let limit = self.content.max_bytes();
        if limit > 0 && metadata.len() > limit {
            debug!(size = metadata.len(), limit, "Rejected oversized document");
            return Err(GuardError::FileTooLarge {
                size: metadata.len(),
                limit,
            });
        }

        let file = tokio::fs::File::open(path).await?;
        let cap = if limit > 0 { limit + 1 } else { u64::MAX };
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        file.take(cap).read_to_end(&mut bytes).await?;
        Ok(bytes)
    }

    /// Resolve a resource referenced from `document` (an image source or a
    /// relative link) to a path inside the document's directory.
    ///
    /// Query strings and fragments are ignored. Absolute URLs are not local
    /// resources and are refused.
    pub fn resolve_resource(&self, document: &str, resource: &str) -> Result<PathBuf, GuardError> {
        let document = self.paths.check(document)?;
        let base = document.parent().ok_or_else(|| GuardError::UnsafePath {
            path: document.display().to_string(),
            reason: "document has no parent directory".into(),
        })?;

        let reference = strip_query_and_fragment(resource);
        if is_absolute_url(reference) {
            return Err(GuardError::UnsafePath {
                path: resource.to_string(),
                reason: "resource is a URL, not a file".into(),
            });
        }
        if reference.contains('\0') {
            return Err(GuardError::UnsafePath {
                path: resource.to_string(),
                reason: "path contains NUL".into(),
            });
        }

        resolve_within(base, reference)
    }
}

fn strip_query_and_fragment(reference: &str) -> &str {
    reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
        .trim()
}

/// `scheme:` with a scheme longer than one character. A single letter is a
/// Windows drive.
fn is_absolute_url(reference: &str) -> bool {
    match reference.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContentConfig;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> String {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn loads_valid_markdown() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "notes.md", "\u{FEFF}# Title\n\nCafé ☕\n".as_bytes());

        let doc = DocumentLoader::default().load(&path).await.unwrap();
        assert_eq!(doc.content, "# Title\n\nCafé ☕\n");
        assert!(doc.path.is_absolute());
        assert!(doc.path.ends_with("notes.md"));
    }

    #[tokio::test]
    async fn nul_in_markdown_file_is_binary() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "tiny.md", b"abcd\0efghi");
        assert_eq!(fs::metadata(&path).unwrap().len(), 10);

        let loader = DocumentLoader::default();
        assert!(loader.path_guard().is_safe(&path));
        let err = loader.load(&path).await.unwrap_err();
        assert!(matches!(err, GuardError::BinaryContent { .. }));
    }

    #[tokio::test]
    async fn wrong_extension_is_never_read() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "image.png", b"\x89PNG\r\n");
        let err = DocumentLoader::default().load(&path).await.unwrap_err();
        assert!(matches!(err, GuardError::UnsafePath { .. }));
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "latin1.md", b"caf\xE9\n");
        let err = DocumentLoader::default().load(&path).await.unwrap_err();
        assert!(matches!(err, GuardError::Encoding { offset: 3 }));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "big.md", &[b'a'; 64]);
        let config = ContentConfig {
            max_bytes: 16,
            ..ContentConfig::default()
        };
        let loader = DocumentLoader::new(
            PathGuard::default(),
            ContentValidator::from_config(&config),
        );
        let err = loader.load(&path).await.unwrap_err();
        assert!(matches!(err, GuardError::FileTooLarge { size: 64, limit: 16 }));
    }

    #[tokio::test]
    async fn missing_file_and_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.md").display().to_string();
        let err = DocumentLoader::default().load(&missing).await.unwrap_err();
        assert!(matches!(err, GuardError::Io(_)));

        let folder = dir.path().join("folder.md");
        fs::create_dir(&folder).unwrap();
        let err = DocumentLoader::default()
            .load(&folder.display().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::UnsafePath { .. }));
    }

    #[test]
    fn resolves_resources_inside_document_dir() {
        let loader = DocumentLoader::default();
        let resolved = loader
            .resolve_resource("/docs/project/readme.md", "images/a.png?v=2#top")
            .unwrap();
        assert_eq!(resolved, PathBuf::from("/docs/project/images/a.png"));
    }

    #[test]
    fn refuses_escaping_or_remote_resources() {
        let loader = DocumentLoader::default();
        let doc = "/docs/project/readme.md";
        assert!(matches!(
            loader.resolve_resource(doc, "../../etc/passwd"),
            Err(GuardError::PathEscape { .. })
        ));
        assert!(matches!(
            loader.resolve_resource(doc, "/etc/hosts"),
            Err(GuardError::PathEscape { .. })
        ));
        assert!(matches!(
            loader.resolve_resource(doc, "https://example.com/a.png"),
            Err(GuardError::UnsafePath { .. })
        ));
        assert!(matches!(
            loader.resolve_resource("/docs/project/readme.txt", "a.png"),
            Err(GuardError::UnsafePath { .. })
        ));
    }

    #[test]
    fn url_detection() {
        assert!(is_absolute_url("https://x"));
        assert!(is_absolute_url("data:image/png;base64,AA"));
        assert!(!is_absolute_url("C:/images/a.png"));
        assert!(!is_absolute_url("images/a.png"));
        assert!(!is_absolute_url("./a:b.png"));
    }
}
