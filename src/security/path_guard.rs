//! Filesystem path checks for documents and their secondary resources.
//!
//! Two independent checks:
//!
//! - [`PathGuard::is_safe`]: is this a path we are willing to open as a
//!   document at all? (extension allowlist, resolved absolutely)
//! - [`is_within`]: does a resource referenced from a document stay inside
//!   the document's directory tree?
//!
//! Both are purely lexical. Nothing here touches the filesystem, so the
//! answer does not depend on whether the file exists yet.

use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::error::GuardError;
use crate::config::FilesConfig;

/// Extension allowlist check for document paths.
#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Lowercase extensions without the leading dot.
    allowed_extensions: Vec<String>,
}

impl Default for PathGuard {
    fn default() -> Self {
        Self::from_config(&FilesConfig::default())
    }
}

impl PathGuard {
    pub fn new<I, S>(allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &FilesConfig) -> Self {
        Self::new(&config.allowed_extensions)
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Whether `path` may be opened as a document.
    ///
    /// # Examples
    ///
    /// ```
    /// use mdguard::security::PathGuard;
    ///
    /// let guard = PathGuard::default();
    /// assert!(guard.is_safe("/a/b/c/doc.md"));
    /// assert!(guard.is_safe("report.MARKDOWN"));
    /// assert!(!guard.is_safe("image.png"));
    /// ```
    pub fn is_safe(&self, path: &str) -> bool {
        self.check(path).is_ok()
    }

    /// Resolve `path` to an absolute, normalized path if it passes the
    /// extension allowlist.
    pub fn check(&self, path: &str) -> Result<PathBuf, GuardError> {
        let reject = |reason: &str| {
            debug!(reason, "Rejected path");
            GuardError::UnsafePath {
                path: path.to_string(),
                reason: reason.to_string(),
            }
        };

        if path.trim().is_empty() {
            return Err(reject("empty path"));
        }
        if path.contains('\0') {
            return Err(reject("path contains NUL"));
        }

        let expanded = shellexpand::tilde(path);
        let resolved = resolve_absolute(Path::new(expanded.as_ref()))
            .map_err(|_| reject("cannot resolve to an absolute path"))?;

        let extension = resolved
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension {
            Some(ext) if self.allowed_extensions.iter().any(|a| *a == ext) => Ok(resolved),
            Some(_) => Err(reject("extension not allowed")),
            None => Err(reject("no file extension")),
        }
    }
}

/// Whether `candidate`, resolved relative to `base`, stays inside `base`.
///
/// An absolute `candidate` is taken as-is. Rejected when the relative path
/// from `base` would begin with `..` or cannot be expressed at all (a
/// different root or drive).
///
/// ```
/// use mdguard::security::is_within;
/// use std::path::Path;
///
/// let base = Path::new("/docs/project");
/// assert!(is_within(base, "images/diagram.png"));
/// assert!(!is_within(base, "../../etc/passwd.md"));
/// ```
pub fn is_within(base: &Path, candidate: impl AsRef<Path>) -> bool {
    contained_path(base, candidate.as_ref()).is_some()
}

/// Like [`is_within`], returning the resolved absolute path on success.
pub fn resolve_within(base: &Path, candidate: &str) -> Result<PathBuf, GuardError> {
    contained_path(base, Path::new(candidate)).ok_or_else(|| {
        debug!(candidate, "Rejected resource outside base directory");
        GuardError::PathEscape {
            base: base.display().to_string(),
            candidate: candidate.to_string(),
        }
    })
}

fn contained_path(base: &Path, candidate: &Path) -> Option<PathBuf> {
    if candidate.as_os_str().is_empty() {
        return None;
    }
    let base = resolve_absolute(base).ok()?;
    let target = resolve_absolute(&base.join(candidate)).ok()?;
    let relative = target.strip_prefix(&base).ok()?;
    match relative.components().next() {
        Some(Component::ParentDir) | Some(Component::RootDir) | Some(Component::Prefix(_)) => None,
        _ => Some(target),
    }
}

/// Make `path` absolute against the current directory and fold `.` and
/// `..` components lexically. `..` at the root stays at the root.
pub fn resolve_absolute(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    Ok(normalize_lexically(&absolute))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root or drive prefix.
                if matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_markdown_extensions() {
        let guard = PathGuard::default();
        assert!(guard.is_safe("/a/b/c/doc.md"));
        assert!(guard.is_safe("report.MARKDOWN"));
        assert!(guard.is_safe("notes/Todo.Md"));
        assert!(guard.is_safe("~/notes/today.md"));
    }

    #[test]
    fn rejects_other_extensions() {
        let guard = PathGuard::default();
        assert!(!guard.is_safe("image.png"));
        assert!(!guard.is_safe("/etc/passwd"));
        assert!(!guard.is_safe("archive.md.zip"));
        assert!(!guard.is_safe("README"));
        assert!(!guard.is_safe(""));
        assert!(!guard.is_safe("   "));
        assert!(!guard.is_safe("evil\0.md"));
    }

    #[test]
    fn hidden_file_named_like_extension_is_rejected() {
        // ".md" is a file stem with no extension
        assert!(!PathGuard::default().is_safe(".md"));
    }

    #[test]
    fn traversal_with_good_extension_passes_is_safe() {
        // Extension policy alone does not catch traversal; is_within does.
        let guard = PathGuard::default();
        assert!(guard.is_safe("../../etc/passwd.md"));
        assert!(!is_within(Path::new("/docs/project"), "../../etc/passwd.md"));
    }

    #[test]
    fn check_returns_normalized_absolute_path() {
        let resolved = PathGuard::default().check("/a/b/../c/./doc.md").unwrap();
        assert_eq!(resolved, PathBuf::from("/a/c/doc.md"));
    }

    #[test]
    fn custom_allowlist_normalizes_entries() {
        let guard = PathGuard::new([".TXT", "md", ""]);
        assert_eq!(guard.allowed_extensions(), &["txt".to_string(), "md".to_string()]);
        assert!(guard.is_safe("a.txt"));
        assert!(!guard.is_safe("a.markdown"));
    }

    #[test]
    fn containment_accepts_nested_resources() {
        let base = Path::new("/docs/project");
        assert!(is_within(base, "img.png"));
        assert!(is_within(base, "./assets/img.png"));
        assert!(is_within(base, "assets/../img.png"));
        assert!(is_within(base, "/docs/project/assets/img.png"));
    }

    #[test]
    fn containment_rejects_escapes() {
        let base = Path::new("/docs/project");
        assert!(!is_within(base, "../secret.md"));
        assert!(!is_within(base, "assets/../../secret.md"));
        assert!(!is_within(base, "/etc/passwd"));
        assert!(!is_within(base, "/docs/project-other/file.md"));
        assert!(!is_within(base, ""));
    }

    #[test]
    fn containment_of_base_itself() {
        // The base directory is trivially inside itself.
        assert!(is_within(Path::new("/docs"), "."));
    }

    #[test]
    fn resolve_within_reports_escape() {
        let err = resolve_within(Path::new("/docs"), "../x.png").unwrap_err();
        assert!(matches!(err, GuardError::PathEscape { .. }));
        let ok = resolve_within(Path::new("/docs"), "a/b.png").unwrap();
        assert_eq!(ok, PathBuf::from("/docs/a/b.png"));
    }

    #[test]
    fn normalize_does_not_climb_past_root() {
        assert_eq!(
            normalize_lexically(Path::new("/../../etc/x.md")),
            PathBuf::from("/etc/x.md")
        );
    }
}
