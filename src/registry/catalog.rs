//! Category catalog — the dynamically extensible set of definitions.
//!
//! Uses DashMap for lock-free concurrent reads: every dispatched request
//! resolves at least one category, while definitions change rarely.

use std::collections::{HashSet, VecDeque};

use dashmap::DashMap;
use tracing::debug;

use crate::model::category::{Category, CategoryId};
use crate::types::{OcciError, Result};

/// Catalog of category definitions, keyed by (scheme, term) identity
#[derive(Default)]
pub struct CategoryCatalog {
    categories: DashMap<CategoryId, Category>,
}

impl CategoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a category. Fails if the identity already exists —
    /// redefinition requires explicit removal first.
    pub fn define(&self, category: Category) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.categories.entry(category.id.clone()) {
            Entry::Occupied(_) => Err(OcciError::DuplicateCategory(category.id.to_string())),
            Entry::Vacant(slot) => {
                debug!(category = %category.id, class = %category.class, "Defined category");
                slot.insert(category);
                Ok(())
            }
        }
    }

    /// Resolve a definition by identity
    pub fn resolve(&self, id: &CategoryId) -> Result<Category> {
        self.categories
            .get(id)
            .map(|c| c.clone())
            .ok_or_else(|| OcciError::NotFound(format!("category {id}")))
    }

    pub fn contains(&self, id: &CategoryId) -> bool {
        self.categories.contains_key(id)
    }

    /// Remove a definition, returning it
    pub fn remove(&self, id: &CategoryId) -> Result<Category> {
        self.categories
            .remove(id)
            .map(|(_, c)| c)
            .ok_or_else(|| OcciError::NotFound(format!("category {id}")))
    }

    /// Whether `a` transitively specializes `b` via `related` edges.
    ///
    /// Walks the catalog breadth-first; related categories that are no
    /// longer defined terminate that branch of the walk.
    pub fn is_related(&self, a: &CategoryId, b: &CategoryId) -> bool {
        let Ok(start) = self.resolve(a) else {
            return false;
        };
        let mut seen: HashSet<CategoryId> = HashSet::new();
        let mut queue: VecDeque<CategoryId> = start.related.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if &id == b {
                return true;
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(cat) = self.categories.get(&id) {
                queue.extend(cat.related.iter().cloned());
            }
        }
        false
    }

    /// The category whose `location` equals the given collection path
    pub fn located_at(&self, path: &str) -> Option<CategoryId> {
        self.categories
            .iter()
            .find(|entry| entry.value().location.as_deref() == Some(path))
            .map(|entry| entry.key().clone())
    }

    /// Snapshot of every definition
    pub fn all(&self) -> Vec<Category> {
        let mut categories: Vec<Category> =
            self.categories.iter().map(|e| e.value().clone()).collect();
        categories.sort_by(|a, b| a.id.cmp(&b.id));
        categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::category::CategoryClass;

    const SCHEME: &str = "http://schemas.example.org/occi/core#";

    #[test]
    fn test_define_rejects_duplicate_identity() {
        let catalog = CategoryCatalog::new();
        catalog.define(Category::kind(SCHEME, "entity")).unwrap();

        let err = catalog.define(Category::kind(SCHEME, "entity")).unwrap_err();
        assert!(matches!(err, OcciError::DuplicateCategory(_)));

        // Distinct identities coexist
        catalog.define(Category::kind(SCHEME, "resource")).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_resolve_missing_is_not_found() {
        let catalog = CategoryCatalog::new();
        let err = catalog
            .resolve(&CategoryId::new(SCHEME, "ghost"))
            .unwrap_err();
        assert!(matches!(err, OcciError::NotFound(_)));
    }

    #[test]
    fn test_redefinition_after_removal() {
        let catalog = CategoryCatalog::new();
        catalog.define(Category::mixin(SCHEME, "tagged")).unwrap();
        let removed = catalog.remove(&CategoryId::new(SCHEME, "tagged")).unwrap();
        assert_eq!(removed.class, CategoryClass::Mixin);
        catalog.define(Category::mixin(SCHEME, "tagged")).unwrap();
    }

    #[test]
    fn test_is_related_is_transitive() {
        let catalog = CategoryCatalog::new();
        let entity = CategoryId::new(SCHEME, "entity");
        let resource = CategoryId::new(SCHEME, "resource");
        let compute = CategoryId::new(SCHEME, "compute");

        catalog.define(Category::kind(SCHEME, "entity")).unwrap();
        catalog
            .define(Category::kind(SCHEME, "resource").with_related(entity.clone()))
            .unwrap();
        catalog
            .define(Category::kind(SCHEME, "compute").with_related(resource.clone()))
            .unwrap();

        assert!(catalog.is_related(&compute, &resource));
        assert!(catalog.is_related(&compute, &entity));
        assert!(catalog.is_related(&resource, &entity));
        // Relatedness is directional
        assert!(!catalog.is_related(&entity, &compute));
        assert!(!catalog.is_related(&compute, &compute));
    }

    #[test]
    fn test_located_at() {
        let catalog = CategoryCatalog::new();
        catalog
            .define(Category::kind(SCHEME, "job").with_location("/job/"))
            .unwrap();
        assert_eq!(
            catalog.located_at("/job/"),
            Some(CategoryId::new(SCHEME, "job"))
        );
        assert!(catalog.located_at("/other/").is_none());
    }
}
