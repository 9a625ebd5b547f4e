//! A validated, normalized relative path.
//!
//! On-disk paths are host-native; serialized paths always use `/`.
//! Normalization happens on import, denormalization on export.
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// A relative path with no `.`/`..` components, stored with `/` separators
/// regardless of host platform.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RelativePath(String);

impl RelativePath {
    /// Build a `RelativePath` from a serialized (always `/`-separated)
    /// string, validating that it has no empty, `.`, or `..` components.
    pub fn new(path: impl Into<String>) -> Option<Self> {
        let path = path.into();
        if path.is_empty() {
            return None;
        }
        let is_clean =
            path.split('/').all(|component| !component.is_empty() && component != "." && component != "..");
        if is_clean {
            Some(Self(path))
        } else {
            None
        }
    }

    /// Build a `RelativePath` from a host path relative to some root,
    /// converting platform separators to `/`.
    pub fn from_host_relative(path: &Path) -> Option<Self> {
        let mut normalized = String::new();
        for component in path.components() {
            use std::path::Component;
            match component {
                Component::Normal(part) => {
                    if !normalized.is_empty() {
                        normalized.push('/');
                    }
                    normalized.push_str(&part.to_string_lossy());
                }
                Component::CurDir => {}
                _ => return None,
            }
        }
        Self::new(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host-native form of this path, to be joined onto an export root.
    pub fn to_host_path(&self) -> PathBuf {
        let mut out = PathBuf::new();
        for component in self.0.split('/') {
            out.push(component);
        }
        out
    }
}

impl Deref for RelativePath {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dotdot_and_empty() {
        assert!(RelativePath::new("a/../b").is_none());
        assert!(RelativePath::new("").is_none());
        assert!(RelativePath::new("a//b").is_none());
    }

    #[test]
    fn accepts_normal_paths() {
        let p = RelativePath::new("assets/textures/a.png").unwrap();
        assert_eq!(p.as_str(), "assets/textures/a.png");
    }

    #[test]
    fn round_trips_through_host_path() {
        let p = RelativePath::new("a/b/c.txt").unwrap();
        let host = p.to_host_path();
        let back = RelativePath::from_host_relative(&host).unwrap();
        assert_eq!(p, back);
    }
}
