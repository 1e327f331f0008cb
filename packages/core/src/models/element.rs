//! Content Element Types
//!
//! `ContentElement` is one entry of a version's `aux.content` list as it is
//! stored. `Element` is a reusable element with its own version history that
//! content entries point at through `reference` entries.

use super::version::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Section an element lands in when it names none
pub const DEFAULT_GROUP: &str = "main";

/// Element type tag
///
/// Unknown tags are kept verbatim so content written by newer themes
/// survives a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ElementKind {
    #[default]
    Text,
    Heading,
    Article,
    Image,
    ImageText,
    Audio,
    Video,
    Cards,
    Hero,
    Slideshow,
    Blog,
    Contact,
    MetaTags,
    Reference,
    Unknown(String),
}

impl ElementKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Heading => "heading",
            Self::Article => "article",
            Self::Image => "image",
            Self::ImageText => "image-text",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Cards => "cards",
            Self::Hero => "hero",
            Self::Slideshow => "slideshow",
            Self::Blog => "blog",
            Self::Contact => "contact",
            Self::MetaTags => "meta-tags",
            Self::Reference => "reference",
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<&str> for ElementKind {
    fn from(tag: &str) -> Self {
        match tag {
            "text" => Self::Text,
            "heading" => Self::Heading,
            "article" => Self::Article,
            "image" => Self::Image,
            "image-text" => Self::ImageText,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "cards" => Self::Cards,
            "hero" => Self::Hero,
            "slideshow" => Self::Slideshow,
            "blog" => Self::Blog,
            "contact" => Self::Contact,
            "meta-tags" => Self::MetaTags,
            "reference" => Self::Reference,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for ElementKind {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<ElementKind> for String {
    fn from(kind: ElementKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of a version's content list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentElement {
    pub id: String,

    #[serde(rename = "type", default)]
    pub kind: ElementKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default)]
    pub data: Map<String, Value>,

    /// File ids in display order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Target of a `reference` entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refid: Option<String>,
}

impl ContentElement {
    pub fn new(id: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            kind,
            group: None,
            data: Map::new(),
            files: Vec::new(),
            refid: None,
        }
    }

    pub fn reference(id: impl Into<String>, refid: impl Into<String>) -> Self {
        Self {
            refid: Some(refid.into()),
            ..Self::new(id, ElementKind::Reference)
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn group_or_default(&self) -> &str {
        self.group.as_deref().unwrap_or(DEFAULT_GROUP)
    }

    /// Parse a stored content list, skipping entries that are not objects
    pub fn list_from_value(value: Option<&Value>) -> Vec<ContentElement> {
        let Some(Value::Array(items)) = value else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| match serde_json::from_value(item.clone()) {
                Ok(element) => Some(element),
                Err(e) => {
                    tracing::debug!("Skipping malformed content element: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Reusable element as seen through one of its versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub name: String,
    pub lang: Option<String>,
    pub data: Map<String, Value>,
    pub files: Vec<String>,
    pub editor: String,
    pub version_id: i64,
}

impl Element {
    /// Element fields stored in a version: `{type, name, data}` plus attached files
    pub fn from_version(version: &Version, files: Vec<String>) -> Self {
        Self {
            id: version.versionable_id.clone(),
            kind: ElementKind::from(version.data_str("type")),
            name: version.data_str("name").to_string(),
            lang: version.lang.clone(),
            data: version
                .data
                .get("data")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            files,
            editor: version.editor.clone(),
            version_id: version.id,
        }
    }
}

/// Input for creating or saving a reusable element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInput {
    #[serde(rename = "type", default)]
    pub kind: ElementKind,
    #[serde(default)]
    pub name: String,
    pub lang: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ElementInput {
    pub fn to_version_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("type".to_string(), Value::String(self.kind.to_string()));
        data.insert("name".to_string(), Value::String(self.name.clone()));
        data.insert("data".to_string(), Value::Object(self.data.clone()));
        data
    }
}
