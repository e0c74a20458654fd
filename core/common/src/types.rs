//! Common types used throughout dropmirror.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Characters the remote service rejects (or misinterprets) in a new entry name.
pub const RESERVED_NAME_CHARS: &str = "/\\<>:\"|?*.";

/// Check a user-supplied name before it is sent to the remote service.
///
/// # Errors
/// - `Validation` if the name is empty or contains any of [`RESERVED_NAME_CHARS`]
pub fn validate_name(name: &str) -> crate::Result<()> {
    if name.trim().is_empty() {
        return Err(crate::Error::Validation("name cannot be empty".to_string()));
    }
    if let Some(c) = name.chars().find(|c| RESERVED_NAME_CHARS.contains(*c)) {
        return Err(crate::Error::Validation(format!(
            "'{}' contains the reserved character '{}'",
            name, c
        )));
    }
    Ok(())
}

/// Stable identifier of a remote entry.
///
/// Survives moves and renames; the tree cache is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Create a new EntryId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "EntryId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A path on the remote service.
///
/// The service addresses its root with the empty string and everything else
/// with a leading '/'; [`RemotePath::to_api_path`] produces that form while
/// `Display` shows the root as "/".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RemotePath {
    components: Vec<String>,
}

impl RemotePath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Errors
    /// - Returns error if any component is empty or contains a separator
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            check_component(comp)?;
        }
        Ok(Self { components })
    }

    /// Parse a path string into RemotePath.
    ///
    /// Uses '/' as separator; "" and "/" are the root.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = path.split('/').map(String::from).collect();
        Self::from_components(components)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the entry name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        check_component(child)?;
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The form the remote API expects: "" for the root, "/a/b" otherwise.
    pub fn to_api_path(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }
}

fn check_component(comp: &str) -> crate::Result<()> {
    if comp.is_empty() {
        return Err(crate::Error::InvalidInput(
            "Path component cannot be empty".to_string(),
        ));
    }
    if comp.contains('/') || comp.contains('\\') {
        return Err(crate::Error::InvalidInput(
            "Path component cannot contain separators".to_string(),
        ));
    }
    Ok(())
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.to_api_path())
        }
    }
}

/// Credential string that is wiped from memory on drop.
///
/// `Debug` never prints the value, so secrets can travel inside structs that
/// end up in log fields.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {} chars])", self.0.len())
    }
}
