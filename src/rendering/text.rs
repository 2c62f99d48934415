//! The `text/occi` codec: header-style line rendering.
//!
//! Each line carries one piece of metadata:
//!
//! ```text
//! Category: compute;scheme="http://schemas.example.org/occi/infra#";class="kind"
//! X-OCCI-Attribute: occi.core.id="/compute/123", hostname="node-1"
//! X-OCCI-Location: /compute/123
//! ```
//!
//! The same forms are accepted from the recognized request headers and
//! from body lines, so the codec works for both header-rendered and
//! body-rendered requests.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::category::{Category, CategoryClass, CategoryId};
use crate::model::entity::{ActionInvocation, Entity, EntityBody, LinkClass};
use crate::registry::CategoryCatalog;
use crate::types::{OcciError, Result};

use super::{Codec, Payload, ATTRIBUTE_HEADER, CATEGORY_HEADER, LOCATION_HEADER};

pub const TEXT_OCCI: &str = "text/occi";

pub struct TextCodec;

/// Split on a separator, ignoring separators inside double quotes
fn split_quoted(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            c if c == sep && !in_quotes => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches('"')
}

fn parse_kv(part: &str) -> Result<(String, String)> {
    let (key, value) = part
        .split_once('=')
        .ok_or_else(|| OcciError::Parsing(format!("expected key=value, got: {part}")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(OcciError::Parsing(format!("attribute without a name: {part}")));
    }
    Ok((key.to_string(), strip_quotes(value).to_string()))
}

/// Parse `term;scheme="...";k="v"...` into the identity and the
/// remaining (lowercased) parameters
fn parse_category_expr(expr: &str) -> Result<(CategoryId, HashMap<String, String>)> {
    let mut parts = split_quoted(expr, ';').into_iter();
    let term = parts
        .next()
        .filter(|t| !t.is_empty() && !t.contains('='))
        .ok_or_else(|| OcciError::Parsing(format!("category without term: {expr}")))?;

    let mut params = HashMap::new();
    for part in parts {
        let (key, value) = parse_kv(&part)?;
        params.insert(key.to_ascii_lowercase(), value);
    }
    let scheme = params
        .remove("scheme")
        .ok_or_else(|| OcciError::Parsing(format!("category {term} without scheme")))?;
    Ok((CategoryId::new(scheme, term), params))
}

/// Gather (lowercased name, value) metadata pairs from the recognized
/// headers and from `Name: value` body lines
fn metadata_lines(payload: &Payload) -> Vec<(String, String)> {
    let mut lines = Vec::new();
    for name in [CATEGORY_HEADER, ATTRIBUTE_HEADER, LOCATION_HEADER] {
        if let Some(value) = payload.header(name) {
            lines.push((name.to_ascii_lowercase(), value.to_string()));
        }
    }
    for line in payload.body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            lines.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }
    lines
}

fn parse_attributes(lines: &[(String, String)]) -> Result<BTreeMap<String, String>> {
    let mut attributes = BTreeMap::new();
    for (name, value) in lines {
        if name != "x-occi-attribute" {
            continue;
        }
        for part in split_quoted(value, ',') {
            let (key, value) = parse_kv(&part)?;
            attributes.insert(key, value);
        }
    }
    Ok(attributes)
}

fn render_category_ref(id: &CategoryId) -> String {
    format!("{};scheme=\"{}\"", id.term, id.scheme)
}

fn render_category_def(category: &Category) -> String {
    let mut rendered = format!(
        "{};scheme=\"{}\";class=\"{}\"",
        category.id.term, category.id.scheme, category.class
    );
    if let Some(title) = &category.title {
        rendered.push_str(&format!(";title=\"{title}\""));
    }
    if !category.related.is_empty() {
        let rel: Vec<String> = category.related.iter().map(CategoryId::uri).collect();
        rendered.push_str(&format!(";rel=\"{}\"", rel.join(" ")));
    }
    if let Some(location) = &category.location {
        rendered.push_str(&format!(";location=\"{location}\""));
    }
    if !category.attributes.is_empty() {
        let names: Vec<&str> = category.attributes.iter().map(String::as_str).collect();
        rendered.push_str(&format!(";attributes=\"{}\"", names.join(" ")));
    }
    if !category.actions.is_empty() {
        let actions: Vec<String> = category.actions.iter().map(CategoryId::uri).collect();
        rendered.push_str(&format!(";actions=\"{}\"", actions.join(" ")));
    }
    rendered
}

impl Codec for TextCodec {
    fn media_type(&self) -> &str {
        TEXT_OCCI
    }

    fn to_entity(
        &self,
        payload: &Payload,
        catalog: &CategoryCatalog,
        existing: Option<&Entity>,
    ) -> Result<Entity> {
        let lines = metadata_lines(payload);

        let mut kind: Option<CategoryId> = None;
        let mut mixins: BTreeSet<CategoryId> = BTreeSet::new();
        for (name, value) in &lines {
            if name != "category" {
                continue;
            }
            for expr in split_quoted(value, ',') {
                let (id, _) = parse_category_expr(&expr)?;
                let category = catalog
                    .resolve(&id)
                    .map_err(|_| OcciError::Parsing(format!("unknown category {id}")))?;
                match category.class {
                    CategoryClass::Kind => {
                        if kind.is_some() {
                            return Err(OcciError::Parsing(
                                "payload carries more than one kind category".to_string(),
                            ));
                        }
                        kind = Some(id);
                    }
                    CategoryClass::Mixin => {
                        mixins.insert(id);
                    }
                    CategoryClass::Action => {
                        return Err(OcciError::Parsing(format!(
                            "category {id} is not a kind or mixin"
                        )));
                    }
                }
            }
        }

        let kind = match (kind, existing) {
            (Some(kind), _) => kind,
            (None, Some(entity)) => entity.kind.clone(),
            (None, None) => {
                return Err(OcciError::Parsing(
                    "payload carries no kind category".to_string(),
                ))
            }
        };

        let mut attributes = parse_attributes(&lines)?;
        let identifier = attributes
            .remove("occi.core.id")
            .or_else(|| existing.map(|e| e.identifier.clone()))
            .unwrap_or_default();
        let source = attributes.remove("occi.core.source");
        let target = attributes.remove("occi.core.target");

        let is_link = source.is_some()
            || target.is_some()
            || existing.map(Entity::is_link).unwrap_or(false);
        let body = if is_link {
            EntityBody::Link {
                source: source.unwrap_or_default(),
                target: target.unwrap_or_default(),
                link_class: LinkClass::Structural,
            }
        } else {
            EntityBody::Resource { links: Vec::new() }
        };

        Ok(Entity {
            identifier,
            kind,
            mixins,
            attributes,
            body,
        })
    }

    fn to_categories(&self, payload: &Payload, catalog: &CategoryCatalog) -> Result<Vec<Category>> {
        let mut categories = Vec::new();
        for (name, value) in &metadata_lines(payload) {
            if name != "category" {
                continue;
            }
            for expr in split_quoted(value, ',') {
                let (id, params) = parse_category_expr(&expr)?;

                // A bare reference resolves to the existing definition;
                // anything else must be a full definition.
                if let Ok(existing) = catalog.resolve(&id) {
                    categories.push(existing);
                    continue;
                }
                let class = params.get("class").ok_or_else(|| {
                    OcciError::Parsing(format!("unknown category {id} without class declaration"))
                })?;
                let mut category = Category::new(id, CategoryClass::parse(class)?);
                category.title = params.get("title").cloned();
                category.location = params.get("location").cloned();
                if let Some(rel) = params.get("rel") {
                    for token in rel.split([' ', ',']).filter(|t| !t.is_empty()) {
                        category.related.insert(CategoryId::from_uri(token)?);
                    }
                }
                if let Some(names) = params.get("attributes") {
                    for name in names.split_whitespace() {
                        category.attributes.insert(name.to_string());
                    }
                }
                if let Some(actions) = params.get("actions") {
                    for token in actions.split_whitespace() {
                        category.actions.insert(CategoryId::from_uri(token)?);
                    }
                }
                categories.push(category);
            }
        }
        if categories.is_empty() {
            return Err(OcciError::Parsing("payload carries no categories".to_string()));
        }
        Ok(categories)
    }

    fn to_action(&self, payload: &Payload, _catalog: &CategoryCatalog) -> Result<ActionInvocation> {
        let lines = metadata_lines(payload);
        let value = lines
            .iter()
            .find(|(name, _)| name == "category")
            .map(|(_, value)| value.clone())
            .ok_or_else(|| OcciError::Parsing("action request without category".to_string()))?;
        let exprs = split_quoted(&value, ',');
        let expr = exprs
            .first()
            .ok_or_else(|| OcciError::Parsing("action request without category".to_string()))?;
        let (action, _) = parse_category_expr(expr)?;

        let mut invocation = ActionInvocation::new(action);
        invocation.attributes = parse_attributes(&lines)?;
        Ok(invocation)
    }

    fn to_locations(&self, payload: &Payload) -> Result<Vec<String>> {
        let mut locations = Vec::new();
        if let Some(value) = payload.header(LOCATION_HEADER) {
            locations.extend(split_quoted(value, ','));
        }
        for line in payload.body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case(LOCATION_HEADER) {
                    locations.extend(split_quoted(value, ','));
                }
            } else if line.starts_with('/') {
                locations.push(line.to_string());
            }
        }
        Ok(locations)
    }

    fn from_entity(&self, entity: &Entity) -> Result<Payload> {
        let mut lines = Vec::new();
        lines.push(format!("Category: {}", render_category_ref(&entity.kind)));
        for mixin in &entity.mixins {
            lines.push(format!("Category: {}", render_category_ref(mixin)));
        }
        if !entity.identifier.is_empty() {
            lines.push(format!(
                "X-OCCI-Attribute: occi.core.id=\"{}\"",
                entity.identifier
            ));
        }
        for (key, value) in &entity.attributes {
            lines.push(format!("X-OCCI-Attribute: {key}=\"{value}\""));
        }
        match &entity.body {
            EntityBody::Link { source, target, .. } => {
                lines.push(format!("X-OCCI-Attribute: occi.core.source=\"{source}\""));
                lines.push(format!("X-OCCI-Attribute: occi.core.target=\"{target}\""));
            }
            EntityBody::Resource { links } => {
                for link in links {
                    lines.push(format!("Link: {link}"));
                }
            }
        }
        Ok(Payload::new()
            .with_header("Content-Type", TEXT_OCCI)
            .with_body(lines.join("\n")))
    }

    fn from_entities(&self, entities: &[Entity]) -> Result<Payload> {
        let lines: Vec<String> = entities
            .iter()
            .map(|e| format!("X-OCCI-Location: {}", e.identifier))
            .collect();
        Ok(Payload::new()
            .with_header("Content-Type", TEXT_OCCI)
            .with_body(lines.join("\n")))
    }

    fn from_categories(&self, categories: &[Category]) -> Result<Payload> {
        let lines: Vec<String> = categories
            .iter()
            .map(|c| format!("Category: {}", render_category_def(c)))
            .collect();
        Ok(Payload::new()
            .with_header("Content-Type", TEXT_OCCI)
            .with_body(lines.join("\n")))
    }
}
