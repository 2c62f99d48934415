//! Category-based resource classification and backend dispatch.
//!
//! The engine underlying an OCCI-style resource management API: every
//! manageable thing — a Resource, or a Link between Resources — carries
//! exactly one Kind and any number of Mixins, drawn from a dynamically
//! extensible category catalog. Each category is bound to a pluggable
//! backend implementing its lifecycle, and a dispatcher translates
//! transport-level requests into lifecycle calls.
//!
//! ## Architecture
//!
//! - [`model`] — categories and entities, the typed value objects
//! - [`registry`] — the category catalog and the category → backend map
//! - [`store`] — the in-memory entity table with link-integrity upkeep
//! - [`backend`] — the [`LifecycleBackend`](backend::LifecycleBackend)
//!   contract plus the built-in mixin and link backends
//! - [`rendering`] — wire codecs (`text/occi`, `application/json`) and
//!   content negotiation
//! - [`dispatch`] — the transport-facing operations tying it together
//!
//! The crate is a library: HTTP method routing, header extraction, and
//! status translation live in the embedding transport, which maps each
//! [`OcciError`] to a status via [`OcciError::status_code`].

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod model;
pub mod registry;
pub mod rendering;
pub mod store;
pub mod types;

pub use config::{EngineConfig, UnregisterPolicy};
pub use dispatch::{Dispatcher, Rendered};
pub use types::{OcciError, Result};
