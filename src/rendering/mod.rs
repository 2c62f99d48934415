//! Wire payloads, the codec contract, and content negotiation.
//!
//! The transport hands dispatch a [`Payload`] — the recognized headers
//! plus the raw body — together with the request's content-type/accept
//! tokens. The [`CodecRegistry`] selects the codec that translates
//! between payloads and the typed model; codecs can be bound and
//! unbound at runtime like any other backend.

pub mod json;
pub mod text;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::model::category::Category;
use crate::model::entity::{ActionInvocation, Entity};
use crate::registry::CategoryCatalog;
use crate::types::{OcciError, Result};

/// Recognized request metadata, normalized regardless of transport
/// casing quirks
pub const CATEGORY_HEADER: &str = "Category";
pub const ATTRIBUTE_HEADER: &str = "X-OCCI-Attribute";
pub const LOCATION_HEADER: &str = "X-OCCI-Location";

/// Decoded transport envelope: selected headers plus the raw body
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the payload carries any decodable content at all
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.body.trim().is_empty()
    }
}

/// Encoder/decoder between wire payloads and the typed model.
///
/// Decoding failures are `Parsing` errors and must propagate — the
/// selector never swallows them.
pub trait Codec: Send + Sync {
    /// The exact media type token this codec is bound to
    fn media_type(&self) -> &str;

    /// Decode an entity. `existing` supplies the kind and identity for
    /// partial updates where the payload may omit the kind category.
    fn to_entity(
        &self,
        payload: &Payload,
        catalog: &CategoryCatalog,
        existing: Option<&Entity>,
    ) -> Result<Entity>;

    /// Decode category definitions or references
    fn to_categories(&self, payload: &Payload, catalog: &CategoryCatalog) -> Result<Vec<Category>>;

    /// Decode an action invocation
    fn to_action(&self, payload: &Payload, catalog: &CategoryCatalog) -> Result<ActionInvocation>;

    /// Decode a list of entity identifiers (mixin membership edits)
    fn to_locations(&self, payload: &Payload) -> Result<Vec<String>>;

    fn from_entity(&self, entity: &Entity) -> Result<Payload>;

    fn from_entities(&self, entities: &[Entity]) -> Result<Payload>;

    fn from_categories(&self, categories: &[Category]) -> Result<Payload>;
}

/// Content negotiation: picks the codec for a requested media type
pub struct CodecRegistry {
    codecs: DashMap<String, Arc<dyn Codec>>,
    /// Media type used when no requested token matches
    default_media_type: Option<String>,
}

impl CodecRegistry {
    pub fn new(default_media_type: Option<String>) -> Self {
        Self {
            codecs: DashMap::new(),
            default_media_type,
        }
    }

    /// Registry preloaded with the built-in codecs, defaulting to
    /// `text/occi`
    pub fn with_builtins() -> Self {
        let registry = Self::new(Some(text::TEXT_OCCI.to_string()));
        registry.bind(Arc::new(text::TextCodec));
        registry.bind(Arc::new(json::JsonCodec));
        registry
    }

    pub fn bind(&self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.media_type().to_string(), codec);
    }

    pub fn unbind(&self, media_type: &str) -> bool {
        self.codecs.remove(media_type).is_some()
    }

    /// Exact token match wins (with and without media type parameters);
    /// otherwise the default codec; otherwise `NoCodec`.
    pub fn select(&self, requested: Option<&str>) -> Result<Arc<dyn Codec>> {
        if let Some(requested) = requested {
            for token in requested.split(',') {
                let token = token.trim();
                if let Some(codec) = self.codecs.get(token) {
                    return Ok(Arc::clone(codec.value()));
                }
                // Retry with q-value and other parameters stripped
                let bare = token.split(';').next().unwrap_or(token).trim();
                if let Some(codec) = self.codecs.get(bare) {
                    return Ok(Arc::clone(codec.value()));
                }
            }
        }
        let default = self
            .default_media_type
            .as_deref()
            .ok_or_else(|| OcciError::NoCodec(requested.unwrap_or("*/*").to_string()))?;
        self.codecs
            .get(default)
            .map(|codec| Arc::clone(codec.value()))
            .ok_or_else(|| OcciError::NoCodec(default.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let payload = Payload::new().with_header("x-occi-attribute", "a=1");
        assert_eq!(payload.header(ATTRIBUTE_HEADER), Some("a=1"));
        assert_eq!(payload.header("X-OCCI-ATTRIBUTE"), Some("a=1"));
        assert!(payload.header(CATEGORY_HEADER).is_none());
    }

    #[test]
    fn test_select_exact_match_wins() {
        let registry = CodecRegistry::with_builtins();
        let codec = registry.select(Some("application/json")).unwrap();
        assert_eq!(codec.media_type(), "application/json");
    }

    #[test]
    fn test_select_scans_accept_tokens_and_strips_params() {
        let registry = CodecRegistry::with_builtins();
        let codec = registry
            .select(Some("text/html, application/json;q=0.9"))
            .unwrap();
        assert_eq!(codec.media_type(), "application/json");
    }

    #[test]
    fn test_select_falls_back_to_default() {
        let registry = CodecRegistry::with_builtins();
        let codec = registry.select(Some("application/xml")).unwrap();
        assert_eq!(codec.media_type(), text::TEXT_OCCI);
        let codec = registry.select(None).unwrap();
        assert_eq!(codec.media_type(), text::TEXT_OCCI);
    }

    #[test]
    fn test_select_without_default_is_no_codec() {
        let registry = CodecRegistry::new(None);
        assert!(matches!(
            registry.select(Some("application/xml")),
            Err(OcciError::NoCodec(_))
        ));
    }

    #[test]
    fn test_unbound_default_is_no_codec() {
        let registry = CodecRegistry::new(Some("text/occi".to_string()));
        assert!(matches!(registry.select(None), Err(OcciError::NoCodec(_))));
    }
}
