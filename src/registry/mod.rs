//! Backend registry — binds categories to the backends implementing
//! their lifecycle.
//!
//! This registry is the sole source of truth for which code handles a
//! category. Lookups are lock-free and hot (every dispatched request
//! resolves at least one backend); registration and unregistration are
//! rare and serialized by an admin mutex so that a failed bulk operation
//! leaves nothing half-registered.

pub mod catalog;

pub use catalog::CategoryCatalog;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::backend::LifecycleBackend;
use crate::model::category::{Category, CategoryId};
use crate::types::{OcciError, Result};

/// Bidirectional association between categories and their backends
pub struct BackendRegistry {
    catalog: Arc<CategoryCatalog>,
    bindings: DashMap<CategoryId, Arc<dyn LifecycleBackend>>,
    /// Serializes register/unregister; lookups bypass it
    admin: Mutex<()>,
}

impl BackendRegistry {
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        Self {
            catalog,
            bindings: DashMap::new(),
            admin: Mutex::new(()),
        }
    }

    /// The catalog this registry defines categories into
    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// Define every category and bind each to the same backend.
    ///
    /// Fails with `DuplicateCategory` if any identity is already defined
    /// or bound, in which case nothing is registered.
    pub async fn register(
        &self,
        categories: Vec<Category>,
        backend: Arc<dyn LifecycleBackend>,
    ) -> Result<()> {
        let _guard = self.admin.lock().await;

        for category in &categories {
            if self.catalog.contains(&category.id) || self.bindings.contains_key(&category.id) {
                return Err(OcciError::DuplicateCategory(category.id.to_string()));
            }
        }

        for category in categories {
            let id = category.id.clone();
            self.catalog.define(category)?;
            self.bindings.insert(id.clone(), Arc::clone(&backend));
            info!(category = %id, "Registered backend");
        }
        Ok(())
    }

    /// Remove binding and definition for each identity.
    ///
    /// Fails with `NotFound` if any is unbound, in which case nothing is
    /// removed. Returns the removed categories so callers can run
    /// follow-up cleanup (e.g. detaching a removed mixin everywhere).
    pub async fn unregister(&self, ids: &[CategoryId]) -> Result<Vec<Category>> {
        let _guard = self.admin.lock().await;

        for id in ids {
            if !self.bindings.contains_key(id) {
                return Err(OcciError::NotFound(format!("no backend bound for {id}")));
            }
        }

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            self.bindings.remove(id);
            removed.push(self.catalog.remove(id)?);
            info!(category = %id, "Unregistered backend");
        }
        Ok(removed)
    }

    /// The backend bound to a category
    pub fn backend_for(&self, id: &CategoryId) -> Result<Arc<dyn LifecycleBackend>> {
        self.bindings
            .get(id)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| OcciError::NotFound(format!("no backend bound for {id}")))
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}
