//! Permission strings and the local permission set.
//!
//! A permission is a `resource:action` token such as `user:read`. The
//! [`SUPERUSER`] token satisfies every query against a [`PermissionSet`].

use std::collections::HashSet;

/// Sentinel permission that grants everything.
pub const SUPERUSER: &str = "admin:manage";

/// Format a permission string from its parts.
pub fn build_permission(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

/// Split a permission string into `(resource, action)`.
///
/// Returns `None` unless the input has exactly two non-empty parts.
pub fn parse_permission(permission: &str) -> Option<(&str, &str)> {
    let mut parts = permission.split(':');
    let resource = parts.next()?;
    let action = parts.next()?;
    if parts.next().is_some() || resource.is_empty() || action.is_empty() {
        return None;
    }
    Some((resource, action))
}

/// The current user's flat permission list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    granted: HashSet<String>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_superuser(&self) -> bool {
        self.granted.contains(SUPERUSER)
    }

    /// Superuser, or `permission` present verbatim.
    pub fn has(&self, permission: &str) -> bool {
        self.is_superuser() || self.granted.contains(permission)
    }

    /// Superuser, or at least one of `permissions` present. Empty input is `false`.
    pub fn has_any<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.is_superuser()
            || permissions
                .iter()
                .any(|p| self.granted.contains(p.as_ref()))
    }

    /// Superuser, or every one of `permissions` present. Empty input is `true`.
    pub fn has_all<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.is_superuser()
            || permissions
                .iter()
                .all(|p| self.granted.contains(p.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.granted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }

    /// Sorted snapshot of the granted permissions.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut out: Vec<String> = self.granted.iter().cloned().collect();
        out.sort();
        out
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            granted: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// What a gated piece of UI asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Single(String),
    Any(Vec<String>),
    All(Vec<String>),
}

impl Requirement {
    pub fn single(resource: &str, action: &str) -> Self {
        Self::Single(build_permission(resource, action))
    }

    pub fn evaluate(&self, set: &PermissionSet) -> bool {
        match self {
            Self::Single(p) => set.has(p),
            Self::Any(ps) => set.has_any(ps),
            Self::All(ps) => set.has_all(ps),
        }
    }
}

/// Outcome for a conditional-rendering wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Permissions are being reloaded; show a placeholder.
    Loading,
    Allow,
    Deny,
}
