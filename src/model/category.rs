//! Category definitions.
//!
//! A category is identified by a (scheme, term) pair and classifies
//! entities either structurally (Kind — exactly one per entity) or
//! additively (Mixin — zero or more per entity). Actions are categories
//! too: a kind declares the actions its instances support.
//!
//! Categories are value objects: once defined in the catalog they are
//! immutable, and redefinition requires explicit removal first.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{OcciError, Result};

/// Identity of a category: (scheme, term), unique across the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId {
    /// Namespace URI, conventionally ending in `#`
    pub scheme: String,
    /// Term inside the scheme
    pub term: String,
}

impl CategoryId {
    pub fn new(scheme: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            term: term.into(),
        }
    }

    /// Full identifier form, e.g. `http://schemas.example.org/occi/infra#compute`
    pub fn uri(&self) -> String {
        if self.scheme.ends_with('#') {
            format!("{}{}", self.scheme, self.term)
        } else {
            format!("{}#{}", self.scheme, self.term)
        }
    }

    /// Parse the identifier form back into (scheme, term).
    ///
    /// The scheme keeps its trailing `#` so that `uri()` round-trips.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let idx = uri
            .rfind('#')
            .ok_or_else(|| OcciError::Parsing(format!("category identifier without scheme: {uri}")))?;
        let term = &uri[idx + 1..];
        if term.is_empty() || idx == 0 {
            return Err(OcciError::Parsing(format!(
                "malformed category identifier: {uri}"
            )));
        }
        Ok(Self::new(&uri[..=idx], term))
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

/// Structural role of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryClass {
    /// Mandatory structural category — every entity has exactly one
    Kind,
    /// Optional additive category, attachable/detachable at runtime
    Mixin,
    /// A named operation declared by a kind or mixin
    Action,
}

impl fmt::Display for CategoryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryClass::Kind => write!(f, "kind"),
            CategoryClass::Mixin => write!(f, "mixin"),
            CategoryClass::Action => write!(f, "action"),
        }
    }
}

impl CategoryClass {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "kind" => Ok(CategoryClass::Kind),
            "mixin" => Ok(CategoryClass::Mixin),
            "action" => Ok(CategoryClass::Action),
            other => Err(OcciError::Parsing(format!("unknown category class: {other}"))),
        }
    }
}

/// A category definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub class: CategoryClass,
    /// Human-readable title
    pub title: Option<String>,
    /// Declared attribute names for entities classified by this category
    pub attributes: BTreeSet<String>,
    /// Categories this one specializes/extends
    pub related: BTreeSet<CategoryId>,
    /// Actions supported by entities of this category
    pub actions: BTreeSet<CategoryId>,
    /// Collection path under which instances are listed
    pub location: Option<String>,
}

impl Category {
    pub fn new(id: CategoryId, class: CategoryClass) -> Self {
        Self {
            id,
            class,
            title: None,
            attributes: BTreeSet::new(),
            related: BTreeSet::new(),
            actions: BTreeSet::new(),
            location: None,
        }
    }

    pub fn kind(scheme: impl Into<String>, term: impl Into<String>) -> Self {
        Self::new(CategoryId::new(scheme, term), CategoryClass::Kind)
    }

    pub fn mixin(scheme: impl Into<String>, term: impl Into<String>) -> Self {
        Self::new(CategoryId::new(scheme, term), CategoryClass::Mixin)
    }

    pub fn action(scheme: impl Into<String>, term: impl Into<String>) -> Self {
        Self::new(CategoryId::new(scheme, term), CategoryClass::Action)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into());
        self
    }

    pub fn with_related(mut self, id: CategoryId) -> Self {
        self.related.insert(id);
        self
    }

    pub fn with_action(mut self, id: CategoryId) -> Self {
        self.actions.insert(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_round_trip() {
        let id = CategoryId::new("http://schemas.example.org/occi/infra#", "compute");
        assert_eq!(id.uri(), "http://schemas.example.org/occi/infra#compute");
        assert_eq!(CategoryId::from_uri(&id.uri()).unwrap(), id);
    }

    #[test]
    fn test_uri_without_trailing_hash() {
        let id = CategoryId::new("urn:example:scheme", "thing");
        assert_eq!(id.uri(), "urn:example:scheme#thing");
        let parsed = CategoryId::from_uri(&id.uri()).unwrap();
        assert_eq!(parsed.term, "thing");
        assert_eq!(parsed.scheme, "urn:example:scheme#");
    }

    #[test]
    fn test_malformed_uri_rejected() {
        assert!(CategoryId::from_uri("no-scheme-separator").is_err());
        assert!(CategoryId::from_uri("http://x.org/scheme#").is_err());
    }

    #[test]
    fn test_builder() {
        let kill = CategoryId::new("http://x.org/job/action#", "kill");
        let kind = Category::kind("http://x.org/occi#", "job")
            .with_title("Job")
            .with_location("/job/")
            .with_attribute("job.executable")
            .with_action(kill.clone());
        assert_eq!(kind.class, CategoryClass::Kind);
        assert_eq!(kind.location.as_deref(), Some("/job/"));
        assert!(kind.actions.contains(&kill));
    }
}
