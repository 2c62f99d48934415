//! The uniform lifecycle contract every backend implements, plus the
//! built-in backends.
//!
//! Backends are plugged in per category and resolved through the
//! [`BackendRegistry`](crate::registry::BackendRegistry) — dispatch is a
//! pure lookup, never runtime type inspection. Backends are free to
//! block on external systems; their failures surface as `Backend`
//! errors rather than hanging the dispatch layer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::entity::{ActionInvocation, Entity, EntityBody};
use crate::store::ResourceStore;
use crate::types::{OcciError, Result};

/// Lifecycle operations invoked against the backend bound to an
/// entity's kind.
#[async_trait]
pub trait LifecycleBackend: Send + Sync {
    /// Validate the entity and apply creation side effects (derived
    /// links, attribute defaults). Fails with `InvalidEntity` when
    /// required attributes or relations are missing.
    async fn create(&self, entity: &mut Entity) -> Result<()>;

    /// Refresh attributes/derived state in place from the backend's
    /// source of truth. Side-effect-free on failure.
    async fn retrieve(&self, entity: &mut Entity) -> Result<()>;

    /// Merge caller-supplied partial changes from `new` into `old`.
    /// Fails with `InvalidEntity` on invalid transitions.
    async fn update(&self, old: &mut Entity, new: &Entity) -> Result<()>;

    /// Backend-specific teardown; called just before store removal and
    /// safe to call on an entity about to disappear.
    async fn delete(&self, entity: &Entity) -> Result<()>;

    /// Execute a declared action against the entity's current state.
    async fn action(&self, entity: &mut Entity, invocation: &ActionInvocation) -> Result<()>;
}

/// No-op backend bound to runtime-registered mixins: such categories
/// only participate in classification.
#[derive(Debug, Default, Clone)]
pub struct MixinBackend;

#[async_trait]
impl LifecycleBackend for MixinBackend {
    async fn create(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }

    async fn retrieve(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }

    async fn update(&self, _old: &mut Entity, _new: &Entity) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _entity: &Entity) -> Result<()> {
        Ok(())
    }

    async fn action(&self, _entity: &mut Entity, _invocation: &ActionInvocation) -> Result<()> {
        Ok(())
    }
}

/// Built-in backend for link kinds.
///
/// Enforces that a link's endpoints resolve to stored resources. The
/// store maintains the source resource's link list itself (inside its
/// write lock) when links are inserted, re-pointed, or removed.
pub struct LinkBackend {
    store: Arc<ResourceStore>,
}

impl LinkBackend {
    pub fn new(store: Arc<ResourceStore>) -> Self {
        Self { store }
    }

    async fn require_resource(&self, id: &str, role: &str) -> Result<()> {
        match self.store.lookup(id).await {
            Some(entity) if !entity.is_link() => Ok(()),
            _ => Err(OcciError::InvalidEntity(format!(
                "link {role} {id} does not resolve to a resource"
            ))),
        }
    }
}

#[async_trait]
impl LifecycleBackend for LinkBackend {
    async fn create(&self, entity: &mut Entity) -> Result<()> {
        let EntityBody::Link { source, target, .. } = &entity.body else {
            return Err(OcciError::InvalidEntity(
                "link backend requires a link entity".to_string(),
            ));
        };
        if source.is_empty() {
            return Err(OcciError::InvalidEntity("a link needs a source".to_string()));
        }
        if target.is_empty() {
            return Err(OcciError::InvalidEntity("a link needs a target".to_string()));
        }
        self.require_resource(source, "source").await?;
        self.require_resource(target, "target").await
    }

    async fn retrieve(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }

    /// Re-points source and/or target when the partial update supplies
    /// them, and replaces the attribute bag wholesale when any
    /// attributes are supplied. An empty field means "unchanged".
    async fn update(&self, old: &mut Entity, new: &Entity) -> Result<()> {
        let (new_source, new_target) = match &new.body {
            EntityBody::Link { source, target, .. } => (source.clone(), target.clone()),
            EntityBody::Resource { .. } => {
                return Err(OcciError::InvalidEntity(
                    "link update payload is not a link".to_string(),
                ))
            }
        };

        if !new_source.is_empty() {
            self.require_resource(&new_source, "source").await?;
        }
        if !new_target.is_empty() {
            self.require_resource(&new_target, "target").await?;
        }

        let EntityBody::Link { source, target, .. } = &mut old.body else {
            return Err(OcciError::InvalidEntity(
                "updated entity is not a link".to_string(),
            ));
        };
        if !new_source.is_empty() {
            // The store moves the back-reference when the entity is
            // written back.
            *source = new_source;
        }
        if !new_target.is_empty() {
            *target = new_target;
        }
        if !new.attributes.is_empty() {
            old.attributes = new.attributes.clone();
        }
        Ok(())
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        let EntityBody::Link { source, .. } = &entity.body else {
            return Err(OcciError::InvalidEntity(
                "link backend requires a link entity".to_string(),
            ));
        };
        self.require_resource(source, "source").await
    }

    async fn action(&self, _entity: &mut Entity, _invocation: &ActionInvocation) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::category::{Category, CategoryId};
    use crate::registry::CategoryCatalog;
    use crate::store::PutMode;

    const SCHEME: &str = "http://schemas.example.org/occi/infra#";

    async fn fixture() -> (Arc<ResourceStore>, LinkBackend) {
        let catalog = Arc::new(CategoryCatalog::new());
        catalog
            .define(Category::kind(SCHEME, "widget").with_location("/widget/"))
            .unwrap();
        catalog.define(Category::kind(SCHEME, "wire")).unwrap();
        let store = Arc::new(ResourceStore::new(catalog));

        for id in ["/widget/a", "/widget/b", "/widget/c"] {
            let mut widget = Entity::resource(CategoryId::new(SCHEME, "widget"));
            widget.identifier = id.to_string();
            store.put(widget, PutMode::Create).await.unwrap();
        }
        let backend = LinkBackend::new(Arc::clone(&store));
        (store, backend)
    }

    fn wire(id: &str, source: &str, target: &str) -> Entity {
        let mut link = Entity::link(CategoryId::new(SCHEME, "wire"), source, target);
        link.identifier = id.to_string();
        link
    }

    #[tokio::test]
    async fn test_create_requires_resolvable_endpoints() {
        let (_, backend) = fixture().await;

        let mut ok = wire("/wire/1", "/widget/a", "/widget/b");
        backend.create(&mut ok).await.unwrap();

        let mut bad_target = wire("/wire/2", "/widget/a", "/widget/ghost");
        let err = backend.create(&mut bad_target).await.unwrap_err();
        assert!(matches!(err, OcciError::InvalidEntity(_)));

        let mut no_source = wire("/wire/3", "", "/widget/b");
        let err = backend.create(&mut no_source).await.unwrap_err();
        assert!(matches!(err, OcciError::InvalidEntity(_)));
    }

    #[tokio::test]
    async fn test_update_repoints_target_only() {
        let (store, backend) = fixture().await;
        let mut link = wire("/wire/1", "/widget/a", "/widget/b");
        backend.create(&mut link).await.unwrap();
        store.put(link.clone(), PutMode::Create).await.unwrap();

        // Partial update: new target, source left empty (= unchanged)
        let partial = wire("/wire/1", "", "/widget/c");
        backend.update(&mut link, &partial).await.unwrap();
        store.put(link.clone(), PutMode::Upsert).await.unwrap();

        assert_eq!(link.source(), Some("/widget/a"));
        assert_eq!(link.target(), Some("/widget/c"));
        // The source's link list still contains the link
        let a = store.get("/widget/a").await.unwrap();
        assert_eq!(a.links(), Some(&["/wire/1".to_string()][..]));
    }

    #[tokio::test]
    async fn test_update_replaces_attributes_wholesale() {
        let (_, backend) = fixture().await;
        let mut link = wire("/wire/1", "/widget/a", "/widget/b");
        link.attributes.insert("bandwidth".into(), "10".into());
        link.attributes.insert("latency".into(), "5".into());

        let mut partial = wire("/wire/1", "", "");
        partial.attributes.insert("bandwidth".into(), "100".into());
        backend.update(&mut link, &partial).await.unwrap();

        assert_eq!(link.attributes.get("bandwidth").map(String::as_str), Some("100"));
        assert!(!link.attributes.contains_key("latency"));
    }

    #[tokio::test]
    async fn test_update_rejects_unresolvable_source() {
        let (_, backend) = fixture().await;
        let mut link = wire("/wire/1", "/widget/a", "/widget/b");

        let partial = wire("/wire/1", "/widget/ghost", "");
        let err = backend.update(&mut link, &partial).await.unwrap_err();
        assert!(matches!(err, OcciError::InvalidEntity(_)));
        // Nothing changed
        assert_eq!(link.source(), Some("/widget/a"));
    }

    #[tokio::test]
    async fn test_delete_requires_live_source() {
        let (store, backend) = fixture().await;
        let link = wire("/wire/1", "/widget/a", "/widget/b");

        backend.delete(&link).await.unwrap();

        store.remove("/widget/a").await.unwrap();
        let err = backend.delete(&link).await.unwrap_err();
        assert!(matches!(err, OcciError::InvalidEntity(_)));
    }
}
