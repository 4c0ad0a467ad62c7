//! Opaque identifiers for associations.
//!
//! The host framework only compares identifiers for equality, so the format
//! is a plain dash-join of the non-empty components. Components are not
//! escaped: `["a-b", "c"]` and `["a", "b-c"]` collide.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Join the non-empty `components` with `-`, preserving order.
///
/// ```
/// use keyturn_core::identity::compose;
///
/// assert_eq!(compose(["a", "", "b"]), "a-b");
/// assert_eq!(compose(["", "", ""]), "");
/// ```
pub fn compose<I, S>(components: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for component in components {
        let component = component.as_ref();
        if component.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('-');
        }
        out.push_str(component);
    }
    out
}

/// Identifier returned to the host framework for a bundle or association.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueIdentifier(String);

impl OpaqueIdentifier {
    /// Compose an identifier from ordered, possibly empty components.
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(compose(components))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpaqueIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_skips_empty() {
        assert_eq!(compose(["a", "", "b"]), "a-b");
        assert_eq!(compose(["", "x"]), "x");
        assert_eq!(compose(Vec::<String>::new()), "");
    }

    #[test]
    fn test_compose_all_empty() {
        assert_eq!(compose(["", "", ""]), "");
    }

    #[test]
    fn test_compose_is_deterministic() {
        let parts = vec!["s1".to_string(), "db1".to_string(), "sdm".to_string()];
        assert_eq!(compose(&parts), compose(&parts));
        assert_eq!(compose(&parts), "s1-db1-sdm");
    }

    #[test]
    fn test_known_collision() {
        assert_eq!(compose(["a-b", "c"]), compose(["a", "b-c"]));
    }

    #[test]
    fn test_identifier_display() {
        let id = OpaqueIdentifier::from_components(["s1", "", "rg1"]);
        assert_eq!(id.to_string(), "s1-rg1");
    }
}
