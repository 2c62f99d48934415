//! The typed object model: categories (Kind/Mixin/Action) and the
//! entities they classify (Resource/Link).

pub mod category;
pub mod entity;

pub use category::{Category, CategoryClass, CategoryId};
pub use entity::{ActionInvocation, Entity, EntityBody, LinkClass};
