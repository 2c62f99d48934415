//! In-memory resource store: owns the identifier → entity mapping.
//!
//! A single RwLock guards the whole table so collection listings observe
//! a consistent snapshot, and link insertion/removal is atomic with the
//! back-reference mutation on the source resource's link list. The store
//! is injected into the dispatch layer — there is no ambient global
//! resource table.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::category::{Category, CategoryId};
use crate::model::entity::{Entity, EntityBody};
use crate::registry::CategoryCatalog;
use crate::types::{OcciError, Result};

/// Insertion semantics for [`ResourceStore::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail with `Conflict` if the identifier already exists
    Create,
    /// Insert or overwrite
    Upsert,
}

/// Identifier → entity table with link-integrity maintenance
pub struct ResourceStore {
    entities: RwLock<HashMap<String, Entity>>,
    /// Needed during listing for location and kind-relatedness checks
    catalog: Arc<CategoryCatalog>,
}

/// Drop the link id from a resource's link list, if present
fn detach_link_ref(entities: &mut HashMap<String, Entity>, source: &str, link_id: &str) {
    if let Some(Entity {
        body: EntityBody::Resource { links },
        ..
    }) = entities.get_mut(source)
    {
        links.retain(|l| l != link_id);
    }
}

impl ResourceStore {
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            catalog,
        }
    }

    /// Insert or overwrite an entity.
    ///
    /// Inserting a link verifies its source resolves to a stored resource
    /// and appends the link id to that resource's link list; upserting a
    /// link whose stored source differs moves the id between the old and
    /// new source's lists. All of it happens under one write lock, so a
    /// concurrent lister never observes a link without its back-reference.
    pub async fn put(&self, entity: Entity, mode: PutMode) -> Result<()> {
        if entity.identifier.is_empty() {
            return Err(OcciError::InvalidEntity(
                "entity has no identifier".to_string(),
            ));
        }

        let mut entities = self.entities.write().await;

        if mode == PutMode::Create && entities.contains_key(&entity.identifier) {
            return Err(OcciError::Conflict(format!(
                "identifier {} already exists",
                entity.identifier
            )));
        }

        if let EntityBody::Link { source, .. } = &entity.body {
            let source = source.clone();
            let link_id = entity.identifier.clone();

            let source_is_resource = matches!(
                entities.get(&source).map(|e| &e.body),
                Some(EntityBody::Resource { .. })
            );
            if !source_is_resource {
                return Err(OcciError::InvalidEntity(format!(
                    "link source {source} does not resolve to a resource"
                )));
            }

            // Stored source, when re-pointing an existing link
            let prev_source = match entities.get(&link_id).map(|e| &e.body) {
                Some(EntityBody::Link { source, .. }) => Some(source.clone()),
                _ => None,
            };

            if prev_source.as_deref() != Some(source.as_str()) {
                if let Some(prev) = prev_source {
                    detach_link_ref(&mut entities, &prev, &link_id);
                }
                if let Some(Entity {
                    body: EntityBody::Resource { links },
                    ..
                }) = entities.get_mut(&source)
                {
                    if !links.iter().any(|l| l == &link_id) {
                        links.push(link_id.clone());
                    }
                }
            }
        }

        debug!(identifier = %entity.identifier, kind = %entity.kind, "Stored entity");
        entities.insert(entity.identifier.clone(), entity);
        Ok(())
    }

    /// Fetch a snapshot of an entity
    pub async fn get(&self, id: &str) -> Result<Entity> {
        self.entities
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OcciError::NotFound(format!("identifier {id}")))
    }

    /// Non-failing lookup for callers that branch on presence
    /// (e.g. GET deciding between an item and a collection path)
    pub async fn lookup(&self, id: &str) -> Option<Entity> {
        self.entities.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entities.read().await.contains_key(id)
    }

    /// Remove an entity and repair link integrity.
    ///
    /// Removing a resource cascade-removes every link that references it
    /// as source or target, detaching each from its source's link list.
    /// Removing a link detaches it from its source's list.
    pub async fn remove(&self, id: &str) -> Result<Entity> {
        let mut entities = self.entities.write().await;
        let removed = entities
            .remove(id)
            .ok_or_else(|| OcciError::NotFound(format!("identifier {id}")))?;

        match &removed.body {
            EntityBody::Resource { .. } => {
                let dangling: Vec<String> = entities
                    .values()
                    .filter_map(|e| match &e.body {
                        EntityBody::Link { source, target, .. }
                            if source == id || target == id =>
                        {
                            Some(e.identifier.clone())
                        }
                        _ => None,
                    })
                    .collect();
                for link_id in dangling {
                    if let Some(Entity {
                        body: EntityBody::Link { source, .. },
                        ..
                    }) = entities.remove(&link_id)
                    {
                        detach_link_ref(&mut entities, &source, &link_id);
                    }
                    debug!(link = %link_id, resource = %id, "Cascade-removed link");
                }
            }
            EntityBody::Link { source, .. } => {
                detach_link_ref(&mut entities, source, id);
            }
        }

        info!(identifier = %id, "Removed entity");
        Ok(removed)
    }

    /// Snapshot listing over a collection path.
    ///
    /// If `path` equals a registered category's location, entities whose
    /// kind equals that category or whose mixin set contains it match.
    /// Otherwise a trailing-slash path is treated as an identifier prefix,
    /// further narrowed by the optional category list: an entity matches
    /// when its kind equals a listed category, its kind is transitively
    /// related to one, or a listed category is in its mixin set.
    pub async fn list(&self, path: &str, categories: Option<&[CategoryId]>) -> Vec<Entity> {
        let entities = self.entities.read().await;
        let mut matched: Vec<Entity> = Vec::new();

        if let Some(located) = self.catalog.located_at(path) {
            for entity in entities.values() {
                if entity.kind == located || entity.mixins.contains(&located) {
                    matched.push(entity.clone());
                }
            }
        } else if path.ends_with('/') {
            for entity in entities.values() {
                if !entity.identifier.starts_with(path) {
                    continue;
                }
                let keep = match categories {
                    None => true,
                    Some(filter) => filter.iter().any(|c| {
                        entity.kind == *c
                            || self.catalog.is_related(&entity.kind, c)
                            || entity.mixins.contains(c)
                    }),
                };
                if keep {
                    matched.push(entity.clone());
                }
            }
        }

        matched.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        matched
    }

    /// Attach a mixin to a stored entity. Idempotent: attaching an
    /// already-present mixin is a no-op, not an error.
    pub async fn attach_mixin(&self, id: &str, mixin: &CategoryId) -> Result<()> {
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(id)
            .ok_or_else(|| OcciError::NotFound(format!("identifier {id}")))?;
        if entity.mixins.insert(mixin.clone()) {
            debug!(identifier = %id, mixin = %mixin, "Attached mixin");
        }
        Ok(())
    }

    /// Detach a mixin from a stored entity. Idempotent like attach.
    pub async fn detach_mixin(&self, id: &str, mixin: &CategoryId) -> Result<()> {
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(id)
            .ok_or_else(|| OcciError::NotFound(format!("identifier {id}")))?;
        if entity.mixins.remove(mixin) {
            debug!(identifier = %id, mixin = %mixin, "Detached mixin");
        }
        Ok(())
    }

    /// Detach a mixin from every entity carrying it (catalog-removal
    /// cascade). Returns how many entities were touched.
    pub async fn detach_mixin_everywhere(&self, mixin: &CategoryId) -> usize {
        let mut entities = self.entities.write().await;
        let mut detached = 0;
        for entity in entities.values_mut() {
            if entity.mixins.remove(mixin) {
                detached += 1;
            }
        }
        if detached > 0 {
            info!(mixin = %mixin, entities = detached, "Detached removed mixin everywhere");
        }
        detached
    }

    /// Whether any stored entity carries the given kind
    pub async fn has_kind_instances(&self, kind: &CategoryId) -> bool {
        self.entities
            .read()
            .await
            .values()
            .any(|e| &e.kind == kind)
    }

    /// Fresh identifier under the kind's location prefix.
    ///
    /// The UUID token makes collisions astronomically unlikely, but
    /// `put(Create)` still re-checks and fails with `Conflict` rather
    /// than overwriting.
    pub fn generate_identifier(&self, kind: &Category) -> String {
        let prefix = kind.location.as_deref().unwrap_or("/");
        format!("{prefix}{}", Uuid::new_v4())
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::category::Category;

    const SCHEME: &str = "http://schemas.example.org/occi/infra#";

    fn fixture() -> (Arc<CategoryCatalog>, ResourceStore) {
        let catalog = Arc::new(CategoryCatalog::new());
        catalog
            .define(Category::kind(SCHEME, "widget").with_location("/widget/"))
            .unwrap();
        catalog.define(Category::kind(SCHEME, "wire")).unwrap();
        catalog.define(Category::mixin(SCHEME, "tagged")).unwrap();
        let store = ResourceStore::new(Arc::clone(&catalog));
        (catalog, store)
    }

    fn widget(id: &str) -> Entity {
        let mut entity = Entity::resource(CategoryId::new(SCHEME, "widget"));
        entity.identifier = id.to_string();
        entity
    }

    fn wire(id: &str, source: &str, target: &str) -> Entity {
        let mut entity = Entity::link(CategoryId::new(SCHEME, "wire"), source, target);
        entity.identifier = id.to_string();
        entity
    }

    #[tokio::test]
    async fn test_create_mode_rejects_existing_identifier() {
        let (_, store) = fixture();
        store.put(widget("/widget/1"), PutMode::Create).await.unwrap();

        let err = store
            .put(widget("/widget/1"), PutMode::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, OcciError::Conflict(_)));

        // Upsert overwrites without complaint
        store.put(widget("/widget/1"), PutMode::Upsert).await.unwrap();
    }

    #[tokio::test]
    async fn test_link_put_appends_back_reference() {
        let (_, store) = fixture();
        store.put(widget("/widget/a"), PutMode::Create).await.unwrap();
        store.put(widget("/widget/b"), PutMode::Create).await.unwrap();
        store
            .put(wire("/wire/1", "/widget/a", "/widget/b"), PutMode::Create)
            .await
            .unwrap();

        let source = store.get("/widget/a").await.unwrap();
        assert_eq!(source.links(), Some(&["/wire/1".to_string()][..]));
    }

    #[tokio::test]
    async fn test_link_put_without_source_fails() {
        let (_, store) = fixture();
        let err = store
            .put(wire("/wire/1", "/widget/ghost", "/widget/b"), PutMode::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, OcciError::InvalidEntity(_)));
        assert!(store.lookup("/wire/1").await.is_none());
    }

    #[tokio::test]
    async fn test_repointing_source_moves_back_reference() {
        let (_, store) = fixture();
        store.put(widget("/widget/a"), PutMode::Create).await.unwrap();
        store.put(widget("/widget/b"), PutMode::Create).await.unwrap();
        store.put(widget("/widget/c"), PutMode::Create).await.unwrap();
        store
            .put(wire("/wire/1", "/widget/a", "/widget/c"), PutMode::Create)
            .await
            .unwrap();

        // Re-point the link's source from a to b
        store
            .put(wire("/wire/1", "/widget/b", "/widget/c"), PutMode::Upsert)
            .await
            .unwrap();

        let old_source = store.get("/widget/a").await.unwrap();
        let new_source = store.get("/widget/b").await.unwrap();
        assert_eq!(old_source.links(), Some(&[][..]));
        assert_eq!(new_source.links(), Some(&["/wire/1".to_string()][..]));
    }

    #[tokio::test]
    async fn test_removing_resource_cascades_links() {
        let (_, store) = fixture();
        store.put(widget("/widget/a"), PutMode::Create).await.unwrap();
        store.put(widget("/widget/b"), PutMode::Create).await.unwrap();
        store.put(widget("/widget/c"), PutMode::Create).await.unwrap();
        // a -> b and c -> a: deleting a must remove both links
        store
            .put(wire("/wire/out", "/widget/a", "/widget/b"), PutMode::Create)
            .await
            .unwrap();
        store
            .put(wire("/wire/in", "/widget/c", "/widget/a"), PutMode::Create)
            .await
            .unwrap();

        store.remove("/widget/a").await.unwrap();

        assert!(store.lookup("/wire/out").await.is_none());
        assert!(store.lookup("/wire/in").await.is_none());
        // c's link list no longer mentions the cascaded link
        let c = store.get("/widget/c").await.unwrap();
        assert_eq!(c.links(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_removing_link_detaches_from_source() {
        let (_, store) = fixture();
        store.put(widget("/widget/a"), PutMode::Create).await.unwrap();
        store.put(widget("/widget/b"), PutMode::Create).await.unwrap();
        store
            .put(wire("/wire/1", "/widget/a", "/widget/b"), PutMode::Create)
            .await
            .unwrap();

        store.remove("/wire/1").await.unwrap();
        let a = store.get("/widget/a").await.unwrap();
        assert_eq!(a.links(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_attach_mixin_is_idempotent() {
        let (_, store) = fixture();
        store.put(widget("/widget/a"), PutMode::Create).await.unwrap();
        let tagged = CategoryId::new(SCHEME, "tagged");

        store.attach_mixin("/widget/a", &tagged).await.unwrap();
        store.attach_mixin("/widget/a", &tagged).await.unwrap();
        assert_eq!(store.get("/widget/a").await.unwrap().mixins.len(), 1);

        store.detach_mixin("/widget/a", &tagged).await.unwrap();
        store.detach_mixin("/widget/a", &tagged).await.unwrap();
        assert!(store.get("/widget/a").await.unwrap().mixins.is_empty());

        let err = store.attach_mixin("/widget/ghost", &tagged).await.unwrap_err();
        assert!(matches!(err, OcciError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_by_location_matches_kind_and_mixin() {
        let (catalog, store) = fixture();
        catalog
            .define(Category::mixin(SCHEME, "featured").with_location("/featured/"))
            .unwrap();
        let featured = CategoryId::new(SCHEME, "featured");

        store.put(widget("/widget/a"), PutMode::Create).await.unwrap();
        let mut other = Entity::resource(CategoryId::new(SCHEME, "wire"));
        other.identifier = "/other/x".to_string();
        other.mixins.insert(featured.clone());
        store.put(other, PutMode::Create).await.unwrap();

        // Location of the widget kind: matches by kind equality
        let widgets = store.list("/widget/", None).await;
        assert_eq!(widgets.len(), 1);
        assert_eq!(widgets[0].identifier, "/widget/a");

        // Location of the featured mixin: matches by mixin membership
        let featured_entities = store.list("/featured/", None).await;
        assert_eq!(featured_entities.len(), 1);
        assert_eq!(featured_entities[0].identifier, "/other/x");
    }

    #[tokio::test]
    async fn test_list_by_prefix_and_category_filter() {
        let (catalog, store) = fixture();
        catalog
            .define(Category::kind(SCHEME, "gadget").with_related(CategoryId::new(SCHEME, "widget")))
            .unwrap();

        store.put(widget("/stuff/w1"), PutMode::Create).await.unwrap();
        let mut gadget = Entity::resource(CategoryId::new(SCHEME, "gadget"));
        gadget.identifier = "/stuff/g1".to_string();
        store.put(gadget, PutMode::Create).await.unwrap();
        store.put(widget("/elsewhere/w2"), PutMode::Create).await.unwrap();

        // No category filter: everything under the prefix
        let all = store.list("/stuff/", None).await;
        assert_eq!(all.len(), 2);

        // Kind equality plus kind-relatedness both match "widget"
        let widget_id = CategoryId::new(SCHEME, "widget");
        let filtered = store.list("/stuff/", Some(&[widget_id])).await;
        assert_eq!(filtered.len(), 2);

        // Unrelated category matches nothing
        let wire_id = CategoryId::new(SCHEME, "wire");
        assert!(store.list("/stuff/", Some(&[wire_id])).await.is_empty());

        // Unrelated prefixes are excluded
        assert!(store.list("/nowhere/", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_generate_identifier_uses_location_prefix() {
        let (catalog, store) = fixture();
        let kind = catalog.resolve(&CategoryId::new(SCHEME, "widget")).unwrap();
        let id = store.generate_identifier(&kind);
        assert!(id.starts_with("/widget/"));
        assert!(id.len() > "/widget/".len());

        // Without a location the root prefix is used
        let bare = catalog.resolve(&CategoryId::new(SCHEME, "wire")).unwrap();
        assert!(store.generate_identifier(&bare).starts_with('/'));
    }

    #[tokio::test]
    async fn test_detach_mixin_everywhere() {
        let (_, store) = fixture();
        let tagged = CategoryId::new(SCHEME, "tagged");
        for id in ["/widget/a", "/widget/b"] {
            store.put(widget(id), PutMode::Create).await.unwrap();
            store.attach_mixin(id, &tagged).await.unwrap();
        }

        assert_eq!(store.detach_mixin_everywhere(&tagged).await, 2);
        assert!(store.get("/widget/a").await.unwrap().mixins.is_empty());
        assert_eq!(store.detach_mixin_everywhere(&tagged).await, 0);
    }
}
