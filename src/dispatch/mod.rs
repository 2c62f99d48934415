//! Request dispatch: the transport-facing operations.
//!
//! The transport decodes verb + path into these calls and translates
//! errors to statuses via [`OcciError::status_code`]. The dispatcher owns
//! the wiring — category catalog, backend registry, resource store, and
//! codec registry — and every operation follows the same shape: negotiate
//! a codec, decode the payload, resolve the backend bound to the entity's
//! kind, run the lifecycle call, write the result back to the store.
//!
//! ## Atomicity
//!
//! `create` persists only after the backend accepted the entity. If the
//! final store insert fails (identifier collision), the backend's `delete`
//! is invoked to roll the creation back and the conflict propagates.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{LifecycleBackend, LinkBackend, MixinBackend};
use crate::config::{EngineConfig, UnregisterPolicy};
use crate::model::category::{Category, CategoryClass, CategoryId};
use crate::model::entity::Entity;
use crate::registry::{BackendRegistry, CategoryCatalog};
use crate::rendering::json::JsonCodec;
use crate::rendering::text::TextCodec;
use crate::rendering::{CodecRegistry, Payload};
use crate::store::{PutMode, ResourceStore};
use crate::types::{OcciError, Result};

/// Response material handed back to the transport
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub headers: HashMap<String, String>,
    pub body: String,
    /// Identifier of a freshly created entity, for the `Location` header
    pub location: Option<String>,
}

impl From<Payload> for Rendered {
    fn from(payload: Payload) -> Self {
        Self {
            headers: payload.headers,
            body: payload.body,
            location: None,
        }
    }
}

/// The classification and dispatch engine
pub struct Dispatcher {
    catalog: Arc<CategoryCatalog>,
    registry: Arc<BackendRegistry>,
    store: Arc<ResourceStore>,
    codecs: Arc<CodecRegistry>,
    config: EngineConfig,
}

impl Dispatcher {
    pub fn new(config: EngineConfig) -> Self {
        let catalog = Arc::new(CategoryCatalog::new());
        let registry = Arc::new(BackendRegistry::new(Arc::clone(&catalog)));
        let store = Arc::new(ResourceStore::new(Arc::clone(&catalog)));
        let codecs = Arc::new(CodecRegistry::new(Some(config.default_media_type.clone())));
        codecs.bind(Arc::new(TextCodec));
        codecs.bind(Arc::new(JsonCodec));
        Self {
            catalog,
            registry,
            store,
            codecs,
            config,
        }
    }

    pub fn catalog(&self) -> &Arc<CategoryCatalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.store
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Define categories and bind them to a backend (service startup and
    /// extension loading)
    pub async fn register(
        &self,
        categories: Vec<Category>,
        backend: Arc<dyn LifecycleBackend>,
    ) -> Result<()> {
        self.registry.register(categories, backend).await
    }

    /// The built-in backend for link kinds, wired to this dispatcher's
    /// store
    pub fn link_backend(&self) -> Arc<dyn LifecycleBackend> {
        Arc::new(LinkBackend::new(Arc::clone(&self.store)))
    }

    /// Remove categories and their bindings.
    ///
    /// Under [`UnregisterPolicy::Reject`] a kind that still has live
    /// entities fails with `Conflict`; under `Orphan` the entities stay
    /// behind for deferred cleanup. An unregistered mixin is detached from
    /// every entity that carried it.
    pub async fn unregister(&self, ids: &[CategoryId]) -> Result<Vec<Category>> {
        if self.config.unregister_policy == UnregisterPolicy::Reject {
            for id in ids {
                let category = self.catalog.resolve(id)?;
                if category.class == CategoryClass::Kind
                    && self.store.has_kind_instances(id).await
                {
                    return Err(OcciError::Conflict(format!(
                        "kind {id} still has live entities"
                    )));
                }
            }
        }
        let removed = self.registry.unregister(ids).await?;
        for category in &removed {
            if category.class == CategoryClass::Mixin {
                self.store.detach_mixin_everywhere(&category.id).await;
            }
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------

    /// GET: a stored entity is refreshed through its backend and rendered;
    /// anything else is treated as a collection path.
    pub async fn get(&self, key: &str, accept: Option<&str>) -> Result<Rendered> {
        if let Some(mut entity) = self.store.lookup(key).await {
            let codec = self.codecs.select(accept)?;
            let backend = self.registry.backend_for(&entity.kind)?;
            backend.retrieve(&mut entity).await?;
            self.store.put(entity.clone(), PutMode::Upsert).await?;
            return Ok(codec.from_entity(&entity)?.into());
        }
        self.get_collection(key, &Payload::new(), None, accept).await
    }

    /// GET on a collection path, optionally narrowed by category
    /// references decoded from the payload. An empty result is `NotFound`.
    pub async fn get_collection(
        &self,
        path: &str,
        payload: &Payload,
        content_type: Option<&str>,
        accept: Option<&str>,
    ) -> Result<Rendered> {
        let filter = if payload.is_empty() {
            None
        } else {
            let codec = self.codecs.select(content_type)?;
            let ids: Vec<CategoryId> = codec
                .to_categories(payload, &self.catalog)?
                .into_iter()
                .map(|c| c.id)
                .collect();
            Some(ids)
        };

        let entities = self.store.list(path, filter.as_deref()).await;
        if entities.is_empty() {
            return Err(OcciError::NotFound(format!("no entities at {path}")));
        }
        let codec = self.codecs.select(accept)?;
        Ok(codec.from_entities(&entities)?.into())
    }

    /// POST on a collection path: decode, assign an identifier under the
    /// kind's location, run the backend's `create`, persist.
    pub async fn create(
        &self,
        path: &str,
        payload: &Payload,
        content_type: Option<&str>,
    ) -> Result<Rendered> {
        let codec = self.codecs.select(content_type)?;
        let mut entity = codec.to_entity(payload, &self.catalog, None)?;
        let kind = self.catalog.resolve(&entity.kind)?;
        if let Some(location) = kind.location.as_deref() {
            if location != path {
                return Err(OcciError::InvalidEntity(format!(
                    "kind {} instances live under {location}, not {path}",
                    kind.id
                )));
            }
        }
        self.validate_attributes(&entity)?;
        // POST always assigns the identifier; caller-chosen keys go
        // through create_at
        entity.identifier = self.store.generate_identifier(&kind);

        let backend = self.registry.backend_for(&entity.kind)?;
        let entity = self.persist_new(&backend, entity).await?;
        let mut rendered: Rendered = codec.from_entity(&entity)?.into();
        rendered.location = Some(entity.identifier);
        Ok(rendered)
    }

    /// PUT on an unoccupied key: create with a caller-supplied identifier
    pub async fn create_at(
        &self,
        key: &str,
        payload: &Payload,
        content_type: Option<&str>,
    ) -> Result<Rendered> {
        let codec = self.codecs.select(content_type)?;
        let mut entity = codec.to_entity(payload, &self.catalog, None)?;
        self.catalog.resolve(&entity.kind)?;
        self.validate_attributes(&entity)?;
        entity.identifier = key.to_string();

        let backend = self.registry.backend_for(&entity.kind)?;
        let entity = self.persist_new(&backend, entity).await?;
        let mut rendered: Rendered = codec.from_entity(&entity)?.into();
        rendered.location = Some(entity.identifier);
        Ok(rendered)
    }

    /// PUT on an entity key: update when it exists, create otherwise
    pub async fn put(
        &self,
        key: &str,
        payload: &Payload,
        content_type: Option<&str>,
    ) -> Result<Rendered> {
        if self.store.contains(key).await {
            self.update(key, payload, content_type).await
        } else {
            self.create_at(key, payload, content_type).await
        }
    }

    /// Partial update of a stored entity. The payload may omit the kind
    /// (it is inherited from the stored entity) but must not change it.
    pub async fn update(
        &self,
        key: &str,
        payload: &Payload,
        content_type: Option<&str>,
    ) -> Result<Rendered> {
        let codec = self.codecs.select(content_type)?;
        let mut entity = self.store.get(key).await?;
        let new = codec.to_entity(payload, &self.catalog, Some(&entity))?;
        if new.kind != entity.kind {
            return Err(OcciError::InvalidEntity(format!(
                "kind of {key} cannot change after creation"
            )));
        }
        self.validate_attributes(&new)?;

        let backend = self.registry.backend_for(&entity.kind)?;
        backend.update(&mut entity, &new).await?;
        self.store.put(entity.clone(), PutMode::Upsert).await?;
        debug!(identifier = %key, "Updated entity");
        Ok(codec.from_entity(&entity)?.into())
    }

    /// Run a declared action against a stored entity and write the
    /// resulting state back.
    pub async fn invoke_action(
        &self,
        key: &str,
        payload: &Payload,
        content_type: Option<&str>,
    ) -> Result<()> {
        let codec = self.codecs.select(content_type)?;
        let invocation = codec.to_action(payload, &self.catalog)?;
        let mut entity = self.store.get(key).await?;
        if !self.action_declared(&entity, &invocation.action) {
            return Err(OcciError::UnsupportedAction(invocation.action.to_string()));
        }

        let backend = self.registry.backend_for(&entity.kind)?;
        backend.action(&mut entity, &invocation).await?;
        info!(identifier = %key, action = %invocation.action, "Invoked action");
        self.store.put(entity, PutMode::Upsert).await
    }

    /// Backend teardown followed by store removal (with link cascade)
    pub async fn delete(&self, key: &str) -> Result<()> {
        let entity = self.store.get(key).await?;
        let backend = self.registry.backend_for(&entity.kind)?;
        backend.delete(&entity).await?;
        self.store.remove(key).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mixin membership
    // ------------------------------------------------------------------

    /// PUT on a mixin's location: attach the mixin to every entity listed
    /// in the payload. Unknown identifiers are skipped, not fatal.
    pub async fn attach_mixins(
        &self,
        path: &str,
        payload: &Payload,
        content_type: Option<&str>,
    ) -> Result<()> {
        let mixin = self.mixin_at(path)?;
        let codec = self.codecs.select(content_type)?;
        for id in codec.to_locations(payload)? {
            match self.store.attach_mixin(&id, &mixin).await {
                Err(OcciError::NotFound(_)) => {
                    debug!(identifier = %id, mixin = %mixin, "Skipped unknown identifier");
                }
                other => other?,
            }
        }
        Ok(())
    }

    /// DELETE on a mixin's location: detach the mixin from the listed
    /// entities.
    pub async fn detach_mixins(
        &self,
        path: &str,
        payload: &Payload,
        content_type: Option<&str>,
    ) -> Result<()> {
        let mixin = self.mixin_at(path)?;
        let codec = self.codecs.select(content_type)?;
        for id in codec.to_locations(payload)? {
            match self.store.detach_mixin(&id, &mixin).await {
                Err(OcciError::NotFound(_)) => {
                    debug!(identifier = %id, mixin = %mixin, "Skipped unknown identifier");
                }
                other => other?,
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Query interface
    // ------------------------------------------------------------------

    /// GET on the query interface: render every registered category
    pub async fn query_categories(&self, accept: Option<&str>) -> Result<Rendered> {
        let codec = self.codecs.select(accept)?;
        Ok(codec.from_categories(&self.catalog.all())?.into())
    }

    /// PUT on the query interface: define user mixins at runtime. Only
    /// mixin categories may come in through this door.
    pub async fn query_register(
        &self,
        payload: &Payload,
        content_type: Option<&str>,
    ) -> Result<()> {
        let codec = self.codecs.select(content_type)?;
        let categories = codec.to_categories(payload, &self.catalog)?;
        for category in &categories {
            if category.class != CategoryClass::Mixin {
                return Err(OcciError::Parsing(format!(
                    "{} is not a mixin category",
                    category.id
                )));
            }
        }
        self.registry.register(categories, Arc::new(MixinBackend)).await
    }

    /// DELETE on the query interface: remove user mixins, detaching them
    /// from every entity.
    pub async fn query_unregister(
        &self,
        payload: &Payload,
        content_type: Option<&str>,
    ) -> Result<()> {
        let codec = self.codecs.select(content_type)?;
        let categories = codec.to_categories(payload, &self.catalog)?;
        let mut ids = Vec::with_capacity(categories.len());
        for category in categories {
            if category.class != CategoryClass::Mixin {
                return Err(OcciError::Parsing(format!(
                    "{} is not a mixin category",
                    category.id
                )));
            }
            ids.push(category.id);
        }
        self.unregister(&ids).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Backend `create` followed by an atomic store insert; a store
    /// rejection rolls the backend's work back before surfacing.
    async fn persist_new(
        &self,
        backend: &Arc<dyn LifecycleBackend>,
        mut entity: Entity,
    ) -> Result<Entity> {
        backend.create(&mut entity).await?;
        if let Err(err) = self.store.put(entity.clone(), PutMode::Create).await {
            warn!(identifier = %entity.identifier, error = %err, "Store rejected new entity, rolling back");
            if let Err(rollback) = backend.delete(&entity).await {
                warn!(identifier = %entity.identifier, error = %rollback, "Rollback delete failed");
            }
            return Err(err);
        }
        info!(identifier = %entity.identifier, kind = %entity.kind, "Created entity");
        Ok(entity)
    }

    /// Every attribute key must be declared by the entity's kind or one of
    /// its mixins; `occi.*` core attributes are always allowed.
    fn validate_attributes(&self, entity: &Entity) -> Result<()> {
        let kind = self.catalog.resolve(&entity.kind)?;
        let mut declared = kind.attributes.clone();
        for mixin in &entity.mixins {
            if let Ok(category) = self.catalog.resolve(mixin) {
                declared.extend(category.attributes.iter().cloned());
            }
        }
        for key in entity.attributes.keys() {
            if !key.starts_with("occi.") && !declared.contains(key) {
                return Err(OcciError::InvalidEntity(format!(
                    "undeclared attribute {key}"
                )));
            }
        }
        Ok(())
    }

    /// The mixin whose location is the given path
    fn mixin_at(&self, path: &str) -> Result<CategoryId> {
        let id = self
            .catalog
            .located_at(path)
            .ok_or_else(|| OcciError::NotFound(format!("no category located at {path}")))?;
        let category = self.catalog.resolve(&id)?;
        if category.class != CategoryClass::Mixin {
            return Err(OcciError::InvalidEntity(format!("{id} is not a mixin")));
        }
        Ok(id)
    }

    fn action_declared(&self, entity: &Entity, action: &CategoryId) -> bool {
        if self
            .catalog
            .resolve(&entity.kind)
            .map(|kind| kind.actions.contains(action))
            .unwrap_or(false)
        {
            return true;
        }
        entity.mixins.iter().any(|mixin| {
            self.catalog
                .resolve(mixin)
                .map(|category| category.actions.contains(action))
                .unwrap_or(false)
        })
    }
}
