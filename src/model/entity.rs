//! Entities: the units the store manages.
//!
//! An entity is either a Resource (with an ordered list of outgoing link
//! identifiers) or a Link between two resources. Every entity carries
//! exactly one kind, assigned at creation and never changed, plus a
//! mutable set of mixins and an attribute bag.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::category::CategoryId;

/// Categorical tag on a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkClass {
    /// Ordinary structural relation between two resources
    Structural,
    /// Derived link pointing at an action endpoint
    Action,
}

/// Body distinguishing the two entity flavors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntityBody {
    Resource {
        /// Ordered outgoing link identifiers
        links: Vec<String>,
    },
    Link {
        /// Identifier of the owning resource; immutable origin of the link
        source: String,
        /// Identifier of the referenced resource
        target: String,
        link_class: LinkClass,
    },
}

/// A Resource or a Link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque, globally unique; assigned at creation
    pub identifier: String,
    /// The single mandatory structural category
    pub kind: CategoryId,
    /// Additional categories, mutable over the entity's lifetime
    pub mixins: BTreeSet<CategoryId>,
    /// Attribute bag keyed by declared attribute names
    pub attributes: BTreeMap<String, String>,
    pub body: EntityBody,
}

impl Entity {
    /// A fresh resource with no identifier yet (assigned on create)
    pub fn resource(kind: CategoryId) -> Self {
        Self {
            identifier: String::new(),
            kind,
            mixins: BTreeSet::new(),
            attributes: BTreeMap::new(),
            body: EntityBody::Resource { links: Vec::new() },
        }
    }

    /// A fresh structural link between two resources
    pub fn link(kind: CategoryId, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            identifier: String::new(),
            kind,
            mixins: BTreeSet::new(),
            attributes: BTreeMap::new(),
            body: EntityBody::Link {
                source: source.into(),
                target: target.into(),
                link_class: LinkClass::Structural,
            },
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self.body, EntityBody::Link { .. })
    }

    /// Outgoing link identifiers, when this entity is a resource
    pub fn links(&self) -> Option<&[String]> {
        match &self.body {
            EntityBody::Resource { links } => Some(links),
            EntityBody::Link { .. } => None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match &self.body {
            EntityBody::Link { source, .. } => Some(source),
            EntityBody::Resource { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.body {
            EntityBody::Link { target, .. } => Some(target),
            EntityBody::Resource { .. } => None,
        }
    }
}

/// A decoded action request against an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInvocation {
    /// Identity of the action category
    pub action: CategoryId,
    /// Parameters supplied with the invocation
    pub attributes: BTreeMap<String, String>,
}

impl ActionInvocation {
    pub fn new(action: CategoryId) -> Self {
        Self {
            action,
            attributes: BTreeMap::new(),
        }
    }
}
