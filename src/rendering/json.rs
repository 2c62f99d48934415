//! The `application/json` codec.
//!
//! Renders entities, categories, and action invocations as plain JSON
//! objects. Category references use the identifier form
//! `scheme#term`; unknown references surface as parsing errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::category::{Category, CategoryClass, CategoryId};
use crate::model::entity::{ActionInvocation, Entity, EntityBody, LinkClass};
use crate::registry::CategoryCatalog;
use crate::types::{OcciError, Result};

use super::{Codec, Payload};

pub const APPLICATION_JSON: &str = "application/json";

pub struct JsonCodec;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct EntityRendering {
    #[serde(skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    mixins: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_class: Option<LinkClass>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    links: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CategoryRendering {
    term: String,
    scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    related: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ActionRendering {
    action: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

fn parse_error(err: serde_json::Error) -> OcciError {
    OcciError::Parsing(format!("malformed json payload: {err}"))
}

fn encode_error(err: serde_json::Error) -> OcciError {
    OcciError::Parsing(format!("unencodable value: {err}"))
}

fn render_entity(entity: &Entity) -> EntityRendering {
    let mut rendering = EntityRendering {
        identifier: Some(entity.identifier.clone()),
        kind: Some(entity.kind.uri()),
        mixins: entity.mixins.iter().map(CategoryId::uri).collect(),
        attributes: entity.attributes.clone(),
        ..EntityRendering::default()
    };
    match &entity.body {
        EntityBody::Link {
            source,
            target,
            link_class,
        } => {
            rendering.source = Some(source.clone());
            rendering.target = Some(target.clone());
            rendering.link_class = Some(*link_class);
        }
        EntityBody::Resource { links } => {
            rendering.links = links.clone();
        }
    }
    rendering
}

fn render_category(category: &Category) -> CategoryRendering {
    CategoryRendering {
        term: category.id.term.clone(),
        scheme: category.id.scheme.clone(),
        class: Some(category.class.to_string()),
        title: category.title.clone(),
        attributes: category.attributes.iter().cloned().collect(),
        related: category.related.iter().map(CategoryId::uri).collect(),
        actions: category.actions.iter().map(CategoryId::uri).collect(),
        location: category.location.clone(),
    }
}

fn build_category(rendering: CategoryRendering, catalog: &CategoryCatalog) -> Result<Category> {
    if rendering.term.is_empty() || rendering.scheme.is_empty() {
        return Err(OcciError::Parsing(
            "category without term or scheme".to_string(),
        ));
    }
    let id = CategoryId::new(rendering.scheme, rendering.term);
    if let Ok(existing) = catalog.resolve(&id) {
        return Ok(existing);
    }
    let class = rendering.class.ok_or_else(|| {
        OcciError::Parsing(format!("unknown category {id} without class declaration"))
    })?;
    let mut category = Category::new(id, CategoryClass::parse(&class)?);
    category.title = rendering.title;
    category.location = rendering.location;
    for uri in rendering.related {
        category.related.insert(CategoryId::from_uri(&uri)?);
    }
    for uri in rendering.actions {
        category.actions.insert(CategoryId::from_uri(&uri)?);
    }
    category.attributes = rendering.attributes.into_iter().collect();
    Ok(category)
}

impl Codec for JsonCodec {
    fn media_type(&self) -> &str {
        APPLICATION_JSON
    }

    fn to_entity(
        &self,
        payload: &Payload,
        catalog: &CategoryCatalog,
        existing: Option<&Entity>,
    ) -> Result<Entity> {
        let rendering: EntityRendering =
            serde_json::from_str(&payload.body).map_err(parse_error)?;

        let kind = match (&rendering.kind, existing) {
            (Some(uri), _) => {
                let id = CategoryId::from_uri(uri)?;
                let category = catalog
                    .resolve(&id)
                    .map_err(|_| OcciError::Parsing(format!("unknown category {id}")))?;
                if category.class != CategoryClass::Kind {
                    return Err(OcciError::Parsing(format!("category {id} is not a kind")));
                }
                id
            }
            (None, Some(entity)) => entity.kind.clone(),
            (None, None) => {
                return Err(OcciError::Parsing(
                    "payload carries no kind category".to_string(),
                ))
            }
        };

        let mut mixins = std::collections::BTreeSet::new();
        for uri in &rendering.mixins {
            let id = CategoryId::from_uri(uri)?;
            let category = catalog
                .resolve(&id)
                .map_err(|_| OcciError::Parsing(format!("unknown category {id}")))?;
            if category.class != CategoryClass::Mixin {
                return Err(OcciError::Parsing(format!("category {id} is not a mixin")));
            }
            mixins.insert(id);
        }

        let identifier = rendering
            .identifier
            .or_else(|| existing.map(|e| e.identifier.clone()))
            .unwrap_or_default();

        let is_link = rendering.source.is_some()
            || rendering.target.is_some()
            || existing.map(Entity::is_link).unwrap_or(false);
        let body = if is_link {
            EntityBody::Link {
                source: rendering.source.unwrap_or_default(),
                target: rendering.target.unwrap_or_default(),
                link_class: rendering.link_class.unwrap_or(LinkClass::Structural),
            }
        } else {
            EntityBody::Resource { links: Vec::new() }
        };

        Ok(Entity {
            identifier,
            kind,
            mixins,
            attributes: rendering.attributes,
            body,
        })
    }

    fn to_categories(&self, payload: &Payload, catalog: &CategoryCatalog) -> Result<Vec<Category>> {
        // Accept a single object or an array of them
        let renderings: Vec<CategoryRendering> = if payload.body.trim_start().starts_with('[') {
            serde_json::from_str(&payload.body).map_err(parse_error)?
        } else {
            vec![serde_json::from_str(&payload.body).map_err(parse_error)?]
        };
        if renderings.is_empty() {
            return Err(OcciError::Parsing("payload carries no categories".to_string()));
        }
        renderings
            .into_iter()
            .map(|r| build_category(r, catalog))
            .collect()
    }

    fn to_action(&self, payload: &Payload, _catalog: &CategoryCatalog) -> Result<ActionInvocation> {
        let rendering: ActionRendering =
            serde_json::from_str(&payload.body).map_err(parse_error)?;
        Ok(ActionInvocation {
            action: CategoryId::from_uri(&rendering.action)?,
            attributes: rendering.attributes,
        })
    }

    fn to_locations(&self, payload: &Payload) -> Result<Vec<String>> {
        serde_json::from_str(&payload.body).map_err(parse_error)
    }

    fn from_entity(&self, entity: &Entity) -> Result<Payload> {
        let body = serde_json::to_string(&render_entity(entity)).map_err(encode_error)?;
        Ok(Payload::new()
            .with_header("Content-Type", APPLICATION_JSON)
            .with_body(body))
    }

    fn from_entities(&self, entities: &[Entity]) -> Result<Payload> {
        let renderings: Vec<EntityRendering> = entities.iter().map(render_entity).collect();
        let body = serde_json::to_string(&renderings).map_err(encode_error)?;
        Ok(Payload::new()
            .with_header("Content-Type", APPLICATION_JSON)
            .with_body(body))
    }

    fn from_categories(&self, categories: &[Category]) -> Result<Payload> {
        let renderings: Vec<CategoryRendering> =
            categories.iter().map(render_category).collect();
        let body = serde_json::to_string(&renderings).map_err(encode_error)?;
        Ok(Payload::new()
            .with_header("Content-Type", APPLICATION_JSON)
            .with_body(body))
    }
}
