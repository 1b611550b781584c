//! Path sandboxing: maps a caller-relative path onto an absolute path that is guaranteed
//! to stay inside a configured root.
//!
//! ### Key properties:
//! - **Lexical only**: `.` and `..` are collapsed without touching any filesystem.
//!   Symbolic links are not resolved, so a link inside the root may still point outside.
//! - **Separator agnostic**: both `/` and `\` are accepted; results always use `/`.
//! - **Configurable case policy**: containment is checked case-sensitively by default,
//!   case-insensitively for Windows-style stores.

use std::borrow::Cow;
use std::fmt;

use crate::core::utils;
use crate::core::{Result, StoreError};

/// How root containment compares path text.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CaseSensitivity {
    #[default]
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    fn fold<'a>(&self, path: &'a str) -> Cow<'a, str> {
        match self {
            CaseSensitivity::Sensitive => Cow::Borrowed(path),
            CaseSensitivity::Insensitive => Cow::Owned(path.to_lowercase()),
        }
    }

    /// Whether `a` and `b` name the same location under this policy.
    pub fn same(&self, a: &str, b: &str) -> bool {
        self.fold(a) == self.fold(b)
    }
}

/// A normalized absolute path that lies within a sandbox root.
///
/// Only [`PathSandbox::resolve`] creates values of this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxedPath {
    full: String,
    key: String,
}

impl SandboxedPath {
    /// Full normalized path, e.g. `/data/sub/file.txt`.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// Root-relative key handed to providers, e.g. `sub/file.txt`. Empty for the root.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }
}

impl fmt::Display for SandboxedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl AsRef<str> for SandboxedPath {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

/// Resolver bound to one root and one case policy.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    drive: String,
    root_segments: Vec<String>,
    root: String,
    case: CaseSensitivity,
}

impl PathSandbox {
    /// Creates a sandbox rooted at `root`.
    /// * `root` must be absolute (`/data`, `C:\data`). It is normalized lexically.
    pub fn new(root: &str, case: CaseSensitivity) -> Result<Self> {
        if root.trim().is_empty() {
            return Err(StoreError::InvalidPath("invalid root path: empty".into()));
        }
        if root.contains('\0') {
            return Err(StoreError::InvalidPath(format!("{root:?} contains NUL")));
        }
        if !utils::is_rooted(root) {
            return Err(StoreError::InvalidPath(format!(
                "the root path must be absolute: {root}"
            )));
        }

        let drive = utils::drive_prefix(root).unwrap_or_default().to_string();
        let root_segments: Vec<String> = utils::collapse(utils::segments(&root[drive.len()..]))
            .into_iter()
            .map(str::to_string)
            .collect();
        let root = render(&drive, root_segments.iter().map(String::as_str));

        Ok(Self {
            drive,
            root_segments,
            root,
            case,
        })
    }

    /// Normalized root, without trailing separator (except the bare `/`).
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case
    }

    /// Resolves `relative` against the root.
    ///
    /// # Errors
    /// * `InvalidPath` - `relative` is rooted (`/x`, `\x`, `X:`) or contains NUL.
    /// * `PathEscapesRoot` - `relative` normalizes to a location outside the root.
    pub fn resolve(&self, relative: &str) -> Result<SandboxedPath> {
        if relative.contains('\0') {
            return Err(StoreError::InvalidPath(format!("{relative:?} contains NUL")));
        }
        if utils::is_rooted(relative) {
            return Err(StoreError::InvalidPath(format!(
                "absolute paths are not permitted: {relative}"
            )));
        }

        let combined = utils::collapse(
            self.root_segments
                .iter()
                .map(String::as_str)
                .chain(utils::segments(relative)),
        );
        let full = render(&self.drive, combined.iter().copied());

        if !self.contains(&full) {
            return Err(StoreError::PathEscapesRoot(relative.to_string()));
        }

        let key = combined[self.root_segments.len()..].join("/");
        Ok(SandboxedPath { full, key })
    }

    fn contains(&self, candidate: &str) -> bool {
        let root = with_trailing_separator(&self.root);
        let candidate = with_trailing_separator(candidate);
        self.case
            .fold(&candidate)
            .starts_with(self.case.fold(&root).as_ref())
    }
}

/// Resolves `relative` against `root` in one call.
pub fn resolve(root: &str, relative: &str, case: CaseSensitivity) -> Result<SandboxedPath> {
    PathSandbox::new(root, case)?.resolve(relative)
}

fn render<'a>(drive: &str, segments: impl Iterator<Item = &'a str>) -> String {
    let mut path = String::from(drive);
    for segment in segments {
        path.push('/');
        path.push_str(segment);
    }
    if path.len() == drive.len() {
        path.push('/');
    }
    path
}

fn with_trailing_separator(path: &str) -> Cow<'_, str> {
    if path.ends_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("{path}/"))
    }
}
