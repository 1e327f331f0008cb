//! Data Models
//!
//! - `Node` - structural page record positioned by nested-set bounds
//! - `Version` - append-only snapshot of a page, element or file
//! - `ContentElement` / `Element` - stored content entries and reusable elements
//! - `File` - shared file metadata with per-language texts

mod element;
mod file;
mod node;
mod version;

pub use element::{ContentElement, Element, ElementInput, ElementKind, DEFAULT_GROUP};
pub use file::{File, FileInput, ResolvedFile};
pub use node::{Node, NodeId, Route};
pub use version::{NewVersion, Version, VersionState, Versionable};
