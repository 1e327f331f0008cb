//! Utility functions for Pagetree Core
//!
//! Small, dependency-free helpers shared by the services: element
//! identifiers, URL slugs and per-language value lookup.

mod lang;
mod slug;
mod uid;

pub use lang::{localized, LangMap};
pub use slug::slugify;
pub use uid::{uid, UidGenerator, ALPHABET, UID_EPOCH_MS};
