//! Path primitives: [PathComponent], [RelativePath], [AbsolutePath].
//!
//! Normalization is validated entirely at construction time; none of these
//! types perform filesystem I/O. Grounded in castore's `Path`/`PathBuf`
//! (slash-joined byte strings, component iteration) generalized to carry an
//! explicit "rooted or not" distinction, since the mount needs to reason
//! about paths from the kernel (always absolute-from-root) separately from
//! paths it walks internally (always relative).
use bstr::ByteSlice;
use std::fmt::{self, Debug, Display};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path component is empty")]
    Empty,
    #[error("path component contains a '/'")]
    ContainsSeparator,
    #[error("path component is '.' or '..'")]
    DotOrDotDot,
    #[error("path component contains a NUL byte")]
    ContainsNul,
}

/// A single, validated path component: never empty, never `.`/`..`, never
/// containing `/` or a NUL byte.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PathComponent(bytes::Bytes);

fn validate_component(v: &[u8]) -> Result<(), PathError> {
    if v.is_empty() {
        return Err(PathError::Empty);
    }
    if v.contains(&b'/') {
        return Err(PathError::ContainsSeparator);
    }
    if v == b"." || v == b".." {
        return Err(PathError::DotOrDotDot);
    }
    if v.contains(&0u8) {
        return Err(PathError::ContainsNul);
    }
    Ok(())
}

impl PathComponent {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for PathComponent {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&str> for PathComponent {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_component(value.as_bytes())?;
        Ok(Self(bytes::Bytes::copy_from_slice(value.as_bytes())))
    }
}

impl TryFrom<bytes::Bytes> for PathComponent {
    type Error = PathError;

    fn try_from(value: bytes::Bytes) -> Result<Self, Self::Error> {
        validate_component(&value)?;
        Ok(Self(value))
    }
}

impl TryFrom<&std::ffi::CStr> for PathComponent {
    type Error = PathError;

    fn try_from(value: &std::ffi::CStr) -> Result<Self, Self::Error> {
        validate_component(value.to_bytes())?;
        Ok(Self(bytes::Bytes::copy_from_slice(value.to_bytes())))
    }
}

impl Debug for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self.0.as_bstr(), f)
    }
}

impl Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self.0.as_bstr(), f)
    }
}

/// A (possibly empty) ordered sequence of components, relative to some
/// unstated root.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RelativePath {
    components: Vec<PathComponent>,
}

impl RelativePath {
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }

    pub fn join(&self, component: PathComponent) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self { components }
    }

    /// Splits off the final component, returning `(parent, name)`, or `None`
    /// if this is the root.
    pub fn split_last(&self) -> Option<(RelativePath, &PathComponent)> {
        let (last, rest) = self.components.split_last()?;
        Some((
            RelativePath {
                components: rest.to_vec(),
            },
            last,
        ))
    }

    /// Parses a `/`-separated string into path components. Rejects absolute
    /// paths, empty components (double slashes), and `.`/`..` segments —
    /// those are InvalidArgument-worthy at the mount boundary, not something
    /// this type silently normalizes away.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        if s.starts_with('/') {
            return Err(PathError::ContainsSeparator);
        }
        let mut components = Vec::new();
        for part in s.split('/') {
            components.push(PathComponent::try_from(part)?);
        }
        Ok(Self { components })
    }
}

impl Debug for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// A path rooted at the mount root. Internally just a [RelativePath] from
/// the root; the distinction exists so callers can't accidentally treat a
/// kernel-supplied absolute path as relative to an arbitrary directory.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct AbsolutePath(RelativePath);

impl AbsolutePath {
    pub fn root() -> Self {
        Self(RelativePath::root())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_root()
    }

    pub fn components(&self) -> &[PathComponent] {
        self.0.components()
    }

    pub fn as_relative(&self) -> &RelativePath {
        &self.0
    }

    pub fn join(&self, component: PathComponent) -> Self {
        Self(self.0.join(component))
    }

    pub fn parse(s: &str) -> Result<Self, PathError> {
        let s = s.strip_prefix('/').unwrap_or(s);
        Ok(Self(RelativePath::parse(s)?))
    }
}

impl Debug for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{:?}", self.0)
    }
}

impl Display for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("a/b")]
    pub fn component_rejects(#[case] s: &str) {
        assert!(PathComponent::try_from(s).is_err());
    }

    #[test]
    fn relative_path_parse_and_split() {
        let p = RelativePath::parse("foo/bar/baz").unwrap();
        assert_eq!(p.components().len(), 3);
        let (parent, name) = p.split_last().unwrap();
        assert_eq!(parent.components().len(), 2);
        assert_eq!(name.as_bytes(), b"baz");
    }

    #[test]
    fn relative_path_root_has_no_split() {
        assert!(RelativePath::root().split_last().is_none());
    }

    #[test]
    fn absolute_path_parse_strips_leading_slash() {
        let p = AbsolutePath::parse("/src/test.c").unwrap();
        assert_eq!(p.components().len(), 2);
    }

    #[rstest]
    #[case("/a/b")]
    #[case("a//b")]
    #[case("a/../b")]
    pub fn relative_path_rejects(#[case] s: &str) {
        assert!(RelativePath::parse(s).is_err());
    }
}
